//! # collaborators::memory
//!
//! In-memory collaborators.  Back the `mock` runtime mode and every test.
//!
//! Each one carries an `unavailable` switch (and the store / ledger a narrower
//! per-operation switch) so tests can drive the orchestrator down its partial
//! failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BalanceCustody, PositionStore, PriceFeed};
use crate::error::CollaboratorError;
use crate::models::{Balance, Position, Quote};

// ─── Position Store ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryPositionStore {
    positions:    RwLock<HashMap<Uuid, Position>>,
    unavailable:  AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self) -> Result<(), CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("position store offline".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl InMemoryPositionStore {
    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, value: bool) {
        self.fail_deletes.store(value, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.positions.read().await.len()
    }
}

#[async_trait]
impl PositionStore for InMemoryPositionStore {
    async fn create_position(&self, position: &Position) -> Result<(), CollaboratorError> {
        self.check()?;
        let mut positions = self.positions.write().await;
        if positions.contains_key(&position.id) {
            return Err(CollaboratorError::Conflict(format!("position {}", position.id)));
        }
        positions.insert(position.id, position.clone());
        Ok(())
    }

    async fn delete_position(&self, id: Uuid) -> Result<(), CollaboratorError> {
        self.check()?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("delete rejected".into()));
        }
        self.positions
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CollaboratorError::NotFound(format!("position {id}")))
    }

    async fn get_position(&self, id: Uuid) -> Result<Position, CollaboratorError> {
        self.check()?;
        self.positions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(format!("position {id}")))
    }

    async fn list_positions(&self, account_id: Uuid) -> Result<Vec<Position>, CollaboratorError> {
        self.check()?;
        let positions = self.positions.read().await;
        let mut owned: Vec<Position> = positions
            .values()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect();
        owned.sort_by_key(|p| p.opened_at);
        Ok(owned)
    }

    async fn list_all_positions(&self) -> Result<Vec<Position>, CollaboratorError> {
        self.check()?;
        let mut all: Vec<Position> = self.positions.read().await.values().cloned().collect();
        all.sort_by_key(|p| p.opened_at);
        Ok(all)
    }
}

// ─── Balance Custody ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryBalanceCustody {
    balances:      RwLock<HashMap<Uuid, Balance>>,
    unavailable:   AtomicBool,
    fail_updates:  AtomicBool,
    /// Applies the write, then reports `Timeout` as a lost response would.
    lose_response: AtomicBool,
    /// Simulated round-trip per call, in milliseconds.
    latency_ms:    AtomicU64,
}

impl InMemoryBalanceCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or overwrites) a ledger entry for `account_id`.
    pub async fn seed(&self, account_id: Uuid, available: BigDecimal) -> Balance {
        let balance = Balance {
            balance_id: Uuid::new_v4(),
            account_id,
            available,
        };
        self.balances.write().await.insert(account_id, balance.clone());
        balance
    }

    async fn round_trip(&self) -> Result<(), CollaboratorError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("balance custody offline".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl InMemoryBalanceCustody {
    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_updates(&self, value: bool) {
        self.fail_updates.store(value, Ordering::SeqCst);
    }

    pub fn set_lose_response(&self, value: bool) {
        self.lose_response.store(value, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl BalanceCustody for InMemoryBalanceCustody {
    async fn get_balance(&self, account_id: Uuid) -> Result<Balance, CollaboratorError> {
        self.round_trip().await?;
        self.balances
            .read()
            .await
            .get(&account_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(format!("account {account_id}")))
    }

    async fn update_balance(&self, balance: &Balance) -> Result<(), CollaboratorError> {
        self.round_trip().await?;
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("ledger write rejected".into()));
        }
        self.balances
            .write()
            .await
            .insert(balance.account_id, balance.clone());

        if self.lose_response.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Timeout(Duration::from_secs(5)));
        }
        Ok(())
    }
}

// ─── Price Feed ───────────────────────────────────────────────────────────────

/// Answers every subscription with the last price set for the instrument.
#[derive(Debug, Default)]
pub struct StaticPriceFeed {
    prices:      RwLock<HashMap<String, BigDecimal>>,
    unavailable: AtomicBool,
}

impl StaticPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_price(&self, instrument: &str, price: BigDecimal) {
        self.prices.write().await.insert(instrument.to_string(), price);
    }
}

#[cfg(test)]
impl StaticPriceFeed {
    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    async fn subscribe(&self, instruments: &[String]) -> Result<Quote, CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("price stream closed".into()));
        }
        let prices = self.prices.read().await;
        instruments
            .iter()
            .find_map(|name| {
                prices.get(name).map(|price| Quote {
                    instrument: name.clone(),
                    price:      price.clone(),
                })
            })
            .ok_or_else(|| {
                CollaboratorError::Unavailable(format!("no quote for {}", instruments.join(",")))
            })
    }
}
