//! # models::request
//!
//! Wire shapes accepted by the HTTP layer and the validation that turns them
//! into typed orders.  Floats are converted to fixed-point here and nowhere
//! else on the inbound path.

use bigdecimal::BigDecimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::decimal;
use crate::error::ValidationError;
use crate::models::Direction;

// ─── Open ─────────────────────────────────────────────────────────────────────

/// Body of `POST /api/positions`.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenPositionRequest {
    pub account_id:  String,
    pub instrument:  String,
    pub direction:   Direction,
    /// Funds to reserve for the position.
    pub funds:       f64,
    #[serde(default)]
    pub stop_loss:   Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
}

/// A validated open request; every field is already in its core type.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub account_id:  Uuid,
    pub instrument:  String,
    pub direction:   Direction,
    pub funds:       BigDecimal,
    pub stop_loss:   Option<BigDecimal>,
    pub take_profit: Option<BigDecimal>,
}

impl OpenPositionRequest {
    pub fn validate(&self) -> Result<OpenOrder, ValidationError> {
        let account_id = parse_id("account_id", &self.account_id)?;

        let instrument = self.instrument.trim();
        if instrument.is_empty() {
            return Err(ValidationError::new("instrument", "is required"));
        }

        let funds = positive_money("funds", self.funds)?;
        let stop_loss = self
            .stop_loss
            .map(|v| positive_money("stop_loss", v))
            .transpose()?;
        let take_profit = self
            .take_profit
            .map(|v| positive_money("take_profit", v))
            .transpose()?;

        // SL must sit on the losing side of TP for the chosen direction.
        if let (Some(sl), Some(tp)) = (&stop_loss, &take_profit) {
            let ordered = match self.direction {
                Direction::Long  => sl < tp,
                Direction::Short => sl > tp,
            };
            if !ordered {
                return Err(ValidationError::new(
                    "stop_loss",
                    format!(
                        "must be {} take_profit for a {} position",
                        if self.direction == Direction::Long { "below" } else { "above" },
                        self.direction.as_str(),
                    ),
                ));
            }
        }

        Ok(OpenOrder {
            account_id,
            instrument: instrument.to_string(),
            direction: self.direction,
            funds,
            stop_loss,
            take_profit,
        })
    }
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// Query of `GET /api/positions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListPositionsQuery {
    pub account_id: String,
}

impl ListPositionsQuery {
    pub fn validate(&self) -> Result<Uuid, ValidationError> {
        parse_id("account_id", &self.account_id)
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

pub fn parse_id(field: &'static str, raw: &str) -> Result<Uuid, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::new(field, "is required"));
    }
    Uuid::parse_str(raw).map_err(|e| ValidationError::new(field, e.to_string()))
}

fn positive_money(field: &'static str, value: f64) -> Result<BigDecimal, ValidationError> {
    let amount = decimal::money(value).map_err(|e| ValidationError::new(field, e.to_string()))?;
    if !decimal::is_positive(&amount) {
        return Err(ValidationError::new(field, "must be at least 0.01"));
    }
    Ok(amount)
}
