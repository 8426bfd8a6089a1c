//! # db: PostgreSQL Position Store
//!
//! Uses `sqlx` for async PostgreSQL.  Compiled only with `--features postgres`.
//!
//! ## Setup
//! 1. Create a database
//! 2. Set `DATABASE_URL` in `.env`
//! 3. Start the service: `migrations/001_init.sql` is applied on connect

use anyhow::Context;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::collaborators::PositionStore;
use crate::error::CollaboratorError;
use crate::models::{Direction, Position};

// ─── Pool Init ────────────────────────────────────────────────────────────────

/// Create the PgPool and run the embedded migration.
pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    run_migrations(&pool).await?;

    info!("✅ PostgreSQL connected and migrations applied");
    Ok(pool)
}

async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
        .execute(pool)
        .await
        .context("Failed to run migration 001_init.sql")?;

    Ok(())
}

// ─── Store ────────────────────────────────────────────────────────────────────

pub struct PgPositionStore {
    pool: PgPool,
}

impl PgPositionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_POSITION: &str = r#"
    SELECT id, account_id, direction, instrument, entry_price,
           total, share_quantity, stop_loss, take_profit, opened_at
    FROM trading.positions
"#;

fn unavailable(err: sqlx::Error) -> CollaboratorError {
    CollaboratorError::Unavailable(format!("postgres: {err}"))
}

fn row_to_position(row: &sqlx::postgres::PgRow) -> Result<Position, CollaboratorError> {
    let direction: String = row.try_get("direction").map_err(unavailable)?;
    let direction = Direction::parse(&direction).ok_or_else(|| {
        CollaboratorError::Unavailable(format!("unknown direction in row: {direction}"))
    })?;

    Ok(Position {
        id:             row.try_get::<Uuid, _>("id").map_err(unavailable)?,
        account_id:     row.try_get::<Uuid, _>("account_id").map_err(unavailable)?,
        direction,
        instrument:     row.try_get("instrument").map_err(unavailable)?,
        entry_price:    row.try_get::<BigDecimal, _>("entry_price").map_err(unavailable)?,
        total:          row.try_get::<BigDecimal, _>("total").map_err(unavailable)?,
        share_quantity: row.try_get::<BigDecimal, _>("share_quantity").map_err(unavailable)?,
        stop_loss:      row.try_get::<Option<BigDecimal>, _>("stop_loss").map_err(unavailable)?,
        take_profit:    row.try_get::<Option<BigDecimal>, _>("take_profit").map_err(unavailable)?,
        opened_at:      row.try_get::<DateTime<Utc>, _>("opened_at").map_err(unavailable)?,
    })
}

#[async_trait]
impl PositionStore for PgPositionStore {
    async fn create_position(&self, position: &Position) -> Result<(), CollaboratorError> {
        sqlx::query(
            r#"
            INSERT INTO trading.positions
              (id, account_id, direction, instrument, entry_price,
               total, share_quantity, stop_loss, take_profit, opened_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(position.id)
        .bind(position.account_id)
        .bind(position.direction.as_str())
        .bind(&position.instrument)
        .bind(&position.entry_price)
        .bind(&position.total)
        .bind(&position.share_quantity)
        .bind(&position.stop_loss)
        .bind(&position.take_profit)
        .bind(position.opened_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                CollaboratorError::Conflict(format!("position {}", position.id))
            }
            _ => unavailable(e),
        })?;

        Ok(())
    }

    async fn delete_position(&self, id: Uuid) -> Result<(), CollaboratorError> {
        let result = sqlx::query("DELETE FROM trading.positions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(CollaboratorError::NotFound(format!("position {id}")));
        }
        Ok(())
    }

    async fn get_position(&self, id: Uuid) -> Result<Position, CollaboratorError> {
        let row = sqlx::query(&format!("{SELECT_POSITION} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| CollaboratorError::NotFound(format!("position {id}")))?;

        row_to_position(&row)
    }

    async fn list_positions(&self, account_id: Uuid) -> Result<Vec<Position>, CollaboratorError> {
        let rows = sqlx::query(&format!(
            "{SELECT_POSITION} WHERE account_id = $1 ORDER BY opened_at"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter().map(row_to_position).collect()
    }

    async fn list_all_positions(&self) -> Result<Vec<Position>, CollaboratorError> {
        let rows = sqlx::query(&format!("{SELECT_POSITION} ORDER BY opened_at"))
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        rows.iter().map(row_to_position).collect()
    }
}
