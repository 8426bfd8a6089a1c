//! # models::quote

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// Current price for one instrument, as delivered by the price feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub instrument: String,
    /// 2dp.
    pub price:      BigDecimal,
}
