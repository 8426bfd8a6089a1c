//! # events
//!
//! Defines [`WsEvent`]: every event the service broadcasts to dashboard
//! clients over `/ws/monitor`.
//!
//! Events are serialized to a JSON `String` before hitting the
//! `tokio::sync::broadcast` channel so receivers never need `Clone` on the
//! domain types.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{CloseReason, Position};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    /// Persisted, registered and funded.
    PositionOpened {
        position: Box<Position>,
    },

    PositionClosed {
        position_id:  Uuid,
        account_id:   Uuid,
        instrument:   String,
        close_price:  f64,
        pnl_percent:  f64,
        absolute_pnl: f64,
        close_reason: CloseReason,
    },

    /// The monitor saw a threshold crossed and is closing the position.
    ThresholdTriggered {
        position_id: Uuid,
        instrument:  String,
        price:       f64,
        reason:      CloseReason,
    },

    /// A multi-step operation stopped half-way; needs an operator.
    Inconsistency {
        position_id: Uuid,
        account_id:  Uuid,
        step:        String,
        reason:      String,
    },

    /// Sent after every monitor tick.
    MonitorStats {
        scanned:   usize,
        triggered: usize,
        skipped:   usize,
    },
}

impl WsEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}
