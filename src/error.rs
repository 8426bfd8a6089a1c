//! # error
//!
//! Centralised error types.
//!
//! * [`CollaboratorError`]: what the store / balance custody / price feed
//!   clients return.
//! * [`PositionError`]: the core taxonomy returned by the orchestrator.
//! * [`AppError`]: what every Axum handler returns.  The `IntoResponse` impl
//!   converts it into a structured JSON error body so callers always get a
//!   machine-readable response even on failure.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bigdecimal::BigDecimal;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

// ─── Collaborator Errors ──────────────────────────────────────────────────────

/// Failure reported by an external collaborator for a single call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollaboratorError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A record with the same identifier already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transport or backend failure; the call may be retried.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

// ─── Validation ───────────────────────────────────────────────────────────────

/// A request field that failed validation before reaching the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid `{field}`: {reason}")]
pub struct ValidationError {
    pub field:  &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self { field, reason: reason.into() }
    }
}

// ─── Core Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PositionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("insufficient funds: need {need}, available {available}")]
    InsufficientFunds { need: BigDecimal, available: BigDecimal },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("position {0} is already registered")]
    DuplicateRegistration(Uuid),

    #[error("quote unavailable for {instrument}: {reason}")]
    QuoteUnavailable { instrument: String, reason: String },

    #[error("{collaborator} unavailable: {reason}")]
    CollaboratorUnavailable { collaborator: &'static str, reason: String },

    /// Registry, ledger and storage disagree after a partial multi-step
    /// failure.  Needs operator reconciliation.
    #[error(
        "internal inconsistency at `{step}` (position {position_id}, account {account_id}): {reason}"
    )]
    InternalInconsistency {
        position_id: Uuid,
        account_id:  Uuid,
        step:        &'static str,
        reason:      String,
    },

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),
}

impl PositionError {
    /// Transient collaborator failures; the caller may retry the whole call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PositionError::QuoteUnavailable { .. } | PositionError::CollaboratorUnavailable { .. }
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            PositionError::Validation(_) | PositionError::InvalidQuantity(_) => {
                StatusCode::BAD_REQUEST
            }
            PositionError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PositionError::NotFound(_) => StatusCode::NOT_FOUND,
            PositionError::DuplicateRegistration(_) => StatusCode::CONFLICT,
            PositionError::QuoteUnavailable { .. }
            | PositionError::CollaboratorUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PositionError::InternalInconsistency { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ─── HTTP Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppError {
    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Position(#[from] PositionError),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Position(PositionError::Validation(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, retryable) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), false),
            AppError::Position(err) => (err.status(), err.to_string(), err.is_retryable()),
        };

        let body = Json(json!({
            "ok":        false,
            "error":     message,
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inconsistency_message_carries_context() {
        let position_id = Uuid::new_v4();
        let account_id = Uuid::new_v4();
        let err = PositionError::InternalInconsistency {
            position_id,
            account_id,
            step: "debit_balance",
            reason: "ledger unavailable".into(),
        };

        let msg = err.to_string();
        assert!(msg.contains("debit_balance"));
        assert!(msg.contains(&position_id.to_string()));
        assert!(msg.contains(&account_id.to_string()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        let quote = PositionError::QuoteUnavailable {
            instrument: "AAPL".into(),
            reason:     "stream closed".into(),
        };
        assert!(quote.is_retryable());
        assert_eq!(quote.status(), StatusCode::SERVICE_UNAVAILABLE);

        let missing = PositionError::NotFound("position".into());
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let invalid = PositionError::from(ValidationError::new("funds", "must be positive"));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.to_string(), "invalid `funds`: must be positive");
    }
}
