//! # models::position
//!
//! Defines the persisted [`Position`] record and its [`Direction`].
//!
//! ## Why no `is_open` flag here?
//! Whether a position is *open* is not a property of the stored record: it is
//! open iff the store holds it **and** the registry holds a registration for
//! it.  See [`crate::registry`].

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Direction ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long  => "LONG",
            Direction::Short => "SHORT",
        }
    }

    /// Inverse of [`Direction::as_str`], used when reading stored rows.
    #[cfg(feature = "postgres")]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LONG"  => Some(Direction::Long),
            "SHORT" => Some(Direction::Short),
            _ => None,
        }
    }
}

// ─── CloseReason ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    /// Caller asked for the close.
    Manual,
    StopLoss,
    TakeProfit,
}

// ─── Position ─────────────────────────────────────────────────────────────────

/// A recorded share holding.
///
/// Money fields are 2dp, `share_quantity` is 4dp.  `total` is the cost basis:
/// the funds reserved at open, ≈ `share_quantity × entry_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id:             Uuid,
    pub account_id:     Uuid,
    pub direction:      Direction,
    pub instrument:     String,
    pub entry_price:    BigDecimal,
    pub total:          BigDecimal,
    pub share_quantity: BigDecimal,
    /// `None` = no stop-loss; never fires.
    pub stop_loss:      Option<BigDecimal>,
    /// `None` = no take-profit; never fires.
    pub take_profit:    Option<BigDecimal>,
    pub opened_at:      DateTime<Utc>,
}
