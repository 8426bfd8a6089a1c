//! # routes::positions
//!
//! ## Endpoints
//!
//! | Method | Path                         | Description                         |
//! |--------|------------------------------|-------------------------------------|
//! | POST   | `/api/positions`             | Open a position                     |
//! | DELETE | `/api/positions/:id`         | Close a position, realize PnL       |
//! | GET    | `/api/positions?account_id=` | Stored positions of one account     |
//! | GET    | `/health`                    | Liveness                            |

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::info;

use crate::{
    decimal,
    error::AppError,
    models::{request::parse_id, CloseReason, ListPositionsQuery, OpenPositionRequest},
    state::SharedState,
};

// ─── POST /api/positions ──────────────────────────────────────────────────────

/// ### Request body
/// ```json
/// {
///   "account_id": "3f1c…",
///   "instrument": "AAPL",
///   "direction": "LONG",
///   "funds": 1000.0,
///   "stop_loss": 45.0,
///   "take_profit": 60.0
/// }
/// ```
///
/// ### Response
/// `201 Created` with `{ "ok": true, "position_id": "…", "position": { … } }`
pub async fn open_position(
    State(state): State<SharedState>,
    payload:      Result<Json<OpenPositionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(body) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let order = body.validate()?;
    info!(account_id = %order.account_id, instrument = %order.instrument, "Open requested");

    let position = state.service.open(order).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "ok":          true,
            "position_id": position.id,
            "position":    position,
        })),
    ))
}

// ─── DELETE /api/positions/:id ────────────────────────────────────────────────

pub async fn close_position(
    State(state): State<SharedState>,
    Path(id):     Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let position_id = parse_id("position_id", &id)?;

    let closed = state.service.close(position_id, CloseReason::Manual).await?;

    Ok(Json(json!({
        "ok":            true,
        "position_id":   closed.position_id,
        "close_price":   decimal::to_f64(&closed.close_price),
        "current_value": decimal::to_f64(&closed.current_value),
        "pnl_percent":   decimal::to_f64(&closed.pnl_percent),
        "absolute_pnl":  decimal::to_f64(&closed.absolute_pnl),
        "new_balance":   decimal::to_f64(&closed.new_balance),
        "close_reason":  closed.reason,
    })))
}

// ─── GET /api/positions ───────────────────────────────────────────────────────

pub async fn list_positions(
    State(state):  State<SharedState>,
    Query(query):  Query<ListPositionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let account_id = query.validate()?;
    let positions = state.service.list_positions(account_id).await?;

    Ok(Json(json!({
        "ok":        true,
        "count":     positions.len(),
        "positions": positions,
    })))
}

// ─── GET /health ──────────────────────────────────────────────────────────────

pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":             true,
        "service":        "position-service",
        "open_positions": state.registry.len().await,
    }))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use bigdecimal::BigDecimal;

    use super::*;
    use crate::collaborators::{
        Collaborators, InMemoryBalanceCustody, InMemoryPositionStore, StaticPriceFeed,
    };
    use crate::config::Config;
    use crate::models::Direction;
    use crate::state::build_state;

    async fn state_with_account() -> (SharedState, uuid::Uuid) {
        let balances = Arc::new(InMemoryBalanceCustody::new());
        let prices = Arc::new(StaticPriceFeed::new());
        let account = uuid::Uuid::new_v4();
        balances.seed(account, BigDecimal::from_str("500.00").unwrap()).await;
        prices.set_price("AAPL", BigDecimal::from_str("50.00").unwrap()).await;

        let collaborators = Collaborators {
            store: Arc::new(InMemoryPositionStore::new()),
            balances,
            prices,
        };
        (build_state(collaborators, &Config::from_env()), account)
    }

    fn body(account: uuid::Uuid, funds: f64) -> OpenPositionRequest {
        OpenPositionRequest {
            account_id:  account.to_string(),
            instrument:  "AAPL".into(),
            direction:   Direction::Long,
            funds,
            stop_loss:   None,
            take_profit: None,
        }
    }

    #[tokio::test]
    async fn test_open_then_close() {
        let (state, account) = state_with_account().await;

        let response = open_position(State(state.clone()), Ok(Json(body(account, 100.0))))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let open = state.service.open_registrations().await;
        assert_eq!(open.len(), 1);

        let response = close_position(State(state.clone()), Path(open[0].position_id.to_string()))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (state, account) = state_with_account().await;

        let err = open_position(State(state.clone()), Ok(Json(body(account, 600.0))))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = close_position(State(state.clone()), Path("nope".into()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = close_position(State(state), Path(uuid::Uuid::new_v4().to_string()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
