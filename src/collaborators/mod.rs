//! # collaborators
//!
//! The three external services the core talks to, as traits:
//!
//! ```text
//!  PositionService ──▶ PositionStore   (PostgreSQL / in-memory)
//!                 ├──▶ BalanceCustody  (HTTP ledger / in-memory)
//!                 └──▶ PriceFeed       (WebSocket quotes / static)
//! ```
//!
//! Each call is assumed atomic on its own; there is no transaction spanning
//! two collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::decimal;
use crate::error::CollaboratorError;
use crate::models::{Balance, Position, Quote};

pub mod balance_http;
pub mod memory;
pub mod price_ws;

pub use balance_http::HttpBalanceCustody;
pub use memory::{InMemoryBalanceCustody, InMemoryPositionStore, StaticPriceFeed};
pub use price_ws::WsPriceFeed;

// ─── Traits ───────────────────────────────────────────────────────────────────

/// Durable storage of position records.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// `Conflict` if a record with the same id exists.
    async fn create_position(&self, position: &Position) -> Result<(), CollaboratorError>;

    async fn delete_position(&self, id: Uuid) -> Result<(), CollaboratorError>;

    async fn get_position(&self, id: Uuid) -> Result<Position, CollaboratorError>;

    async fn list_positions(&self, account_id: Uuid) -> Result<Vec<Position>, CollaboratorError>;

    /// Every stored position; used to rebuild the registry at startup.
    async fn list_all_positions(&self) -> Result<Vec<Position>, CollaboratorError>;
}

/// The funds ledger.
#[async_trait]
pub trait BalanceCustody: Send + Sync {
    async fn get_balance(&self, account_id: Uuid) -> Result<Balance, CollaboratorError>;

    async fn update_balance(&self, balance: &Balance) -> Result<(), CollaboratorError>;
}

/// Quote source.  A subscription is opened but only the first quote is used.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn subscribe(&self, instruments: &[String]) -> Result<Quote, CollaboratorError>;
}

// ─── Wiring ───────────────────────────────────────────────────────────────────

/// The concrete collaborator set chosen from [`Config`].
#[derive(Clone)]
pub struct Collaborators {
    pub store:    Arc<dyn PositionStore>,
    pub balances: Arc<dyn BalanceCustody>,
    pub prices:   Arc<dyn PriceFeed>,
}

pub async fn build(config: &Config, http_client: reqwest::Client) -> anyhow::Result<Collaborators> {
    let store = build_store(config).await?;

    let balances: Arc<dyn BalanceCustody> = if config.balance_service_url == "mock" {
        info!("🎭 Balance custody in MOCK mode — in-memory ledger");
        let ledger = InMemoryBalanceCustody::new();
        for (account_id, amount) in &config.mock_balances {
            ledger.seed(*account_id, decimal::money(*amount)?).await;
        }
        Arc::new(ledger)
    } else {
        info!(url = %config.balance_service_url, "Balance custody over HTTP");
        Arc::new(HttpBalanceCustody::new(
            http_client,
            &config.balance_service_url,
            config.request_timeout,
        ))
    };

    let prices: Arc<dyn PriceFeed> = if config.price_feed_url == "mock" {
        info!("🎭 Price feed in MOCK mode — static quotes");
        let feed = StaticPriceFeed::new();
        for (instrument, price) in &config.mock_prices {
            feed.set_price(instrument, decimal::money(*price)?).await;
        }
        Arc::new(feed)
    } else {
        info!(url = %config.price_feed_url, "Price feed over WebSocket");
        Arc::new(WsPriceFeed::new(&config.price_feed_url, config.quote_timeout))
    };

    Ok(Collaborators { store, balances, prices })
}

#[cfg(feature = "postgres")]
async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn PositionStore>> {
    match &config.database_url {
        Some(url) => {
            let pool = crate::db::init_pool(url).await?;
            Ok(Arc::new(crate::db::PgPositionStore::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set — positions are kept in memory only");
            Ok(Arc::new(InMemoryPositionStore::new()))
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn PositionStore>> {
    if config.database_url.is_some() {
        warn!("DATABASE_URL is set but the `postgres` feature is off — using in-memory store");
    } else {
        warn!("No database configured — positions are kept in memory only");
    }
    Ok(Arc::new(InMemoryPositionStore::new()))
}
