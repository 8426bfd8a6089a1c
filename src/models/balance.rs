//! # models::balance

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Funds held for an account by the balance custody service.
///
/// Only the orchestrator ever builds an updated copy of this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub balance_id: Uuid,
    pub account_id: Uuid,
    /// Available funds, 2dp.
    pub available:  BigDecimal,
}

impl Balance {
    /// Same ledger entry with a new available amount.
    pub fn with_available(&self, available: BigDecimal) -> Self {
        Self {
            balance_id: self.balance_id,
            account_id: self.account_id,
            available,
        }
    }
}
