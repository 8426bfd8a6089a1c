//! # config: Runtime Configuration
//!
//! Everything is read from the environment (after `.env` is loaded).
//!
//! ## Mock Mode
//! `BALANCE_SERVICE_URL=mock` / `PRICE_FEED_URL=mock` swap the remote
//! collaborators for in-memory ones, seeded from:
//! ```text
//! MOCK_BALANCES=3f1c…=1000.00,9a2e…=250
//! MOCK_PRICES=AAPL=187.42,MSFT=410.10
//! ```

use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr:           String,
    /// `None` → in-memory position store.
    pub database_url:        Option<String>,
    pub balance_service_url: String,
    pub price_feed_url:      String,
    pub mock_balances:       Vec<(Uuid, f64)>,
    pub mock_prices:         Vec<(String, f64)>,
    pub monitor_interval:    Duration,
    pub quote_timeout:       Duration,
    pub request_timeout:     Duration,
    /// Empty → auth disabled.
    pub api_key:             String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr:           env_or("BIND_ADDR", "0.0.0.0:8083"),
            database_url:        std::env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            balance_service_url: env_or("BALANCE_SERVICE_URL", "mock"),
            price_feed_url:      env_or("PRICE_FEED_URL", "mock"),
            mock_balances:       parse_balances(&env_or("MOCK_BALANCES", "")),
            mock_prices:         parse_prices(&env_or("MOCK_PRICES", "")),
            monitor_interval:    Duration::from_millis(env_u64("MONITOR_INTERVAL_MS", 1000).max(1)),
            quote_timeout:       Duration::from_secs(env_u64("QUOTE_TIMEOUT_SECS", 5)),
            request_timeout:     Duration::from_secs(env_u64("REQUEST_TIMEOUT_SECS", 5)),
            api_key:             env_or("API_KEY", ""),
        }
    }

    pub fn auth_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ─── Seed Parsing ─────────────────────────────────────────────────────────────

/// `KEY=value,KEY=value` → pairs.  Malformed entries are skipped with a warning.
fn parse_pairs(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once('=') {
            Some((key, value)) => Some((key.trim(), value.trim())),
            None => {
                warn!(entry, "Ignoring malformed seed entry (expected KEY=value)");
                None
            }
        })
}

fn parse_prices(raw: &str) -> Vec<(String, f64)> {
    parse_pairs(raw)
        .filter_map(|(symbol, price)| match price.parse::<f64>() {
            Ok(p) if p.is_finite() && p > 0.0 && !symbol.is_empty() => Some((symbol.to_string(), p)),
            _ => {
                warn!(symbol, price, "Ignoring bad MOCK_PRICES entry");
                None
            }
        })
        .collect()
}

fn parse_balances(raw: &str) -> Vec<(Uuid, f64)> {
    parse_pairs(raw)
        .filter_map(|(account, amount)| {
            match (Uuid::parse_str(account), amount.parse::<f64>()) {
                (Ok(id), Ok(a)) if a.is_finite() && a >= 0.0 => Some((id, a)),
                _ => {
                    warn!(account, amount, "Ignoring bad MOCK_BALANCES entry");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prices() {
        let prices = parse_prices(" AAPL=187.42 , MSFT=410.1,,BAD,ZERO=0,NAN=abc");
        assert_eq!(
            prices,
            vec![("AAPL".to_string(), 187.42), ("MSFT".to_string(), 410.1)]
        );
    }

    #[test]
    fn test_parse_balances() {
        let id = Uuid::new_v4();
        let raw = format!("{id}=1000.5,not-a-uuid=10,{id}=-1");
        assert_eq!(parse_balances(&raw), vec![(id, 1000.5)]);
    }

    #[test]
    fn test_empty_seed() {
        assert!(parse_prices("").is_empty());
        assert!(parse_balances("   ").is_empty());
    }
}
