//! # registry
//!
//! The authoritative in-memory record of which positions are **open**.
//!
//! ## Rules
//! * One registration per position id; first writer wins, the loser gets
//!   `DuplicateRegistration`.
//! * `register` / `unregister` take the write lock, `snapshot` the read lock.
//! * Nothing performs I/O while holding the lock.  The monitor copies a
//!   [`snapshot`](PositionRegistry::snapshot) out and works on the copy.

use std::collections::HashMap;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::PositionError;
use crate::models::{Direction, Position};

// ─── OpenRegistration ─────────────────────────────────────────────────────────

/// Marks a position as open and watched.
///
/// Prices are snapshots taken at registration time; the monitor re-reads the
/// stored [`Position`] before acting on them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenRegistration {
    pub position_id:    Uuid,
    pub account_id:     Uuid,
    pub instrument:     String,
    pub direction:      Direction,
    pub entry_price:    BigDecimal,
    pub stop_loss:      Option<BigDecimal>,
    pub take_profit:    Option<BigDecimal>,
    pub share_quantity: BigDecimal,
    /// `false` only on the copy handed back by `unregister`.
    pub is_open:        bool,
    /// Monotonic registration order; snapshots are sorted by it.
    pub sequence:       u64,
    pub registered_at:  DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries:       HashMap<Uuid, OpenRegistration>,
    next_sequence: u64,
}

// ─── PositionRegistry ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PositionRegistry {
    inner: RwLock<RegistryInner>,
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        account_id: Uuid,
        position:   &Position,
    ) -> Result<OpenRegistration, PositionError> {
        let mut inner = self.inner.write().await;

        if inner.entries.contains_key(&position.id) {
            return Err(PositionError::DuplicateRegistration(position.id));
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let registration = OpenRegistration {
            position_id:    position.id,
            account_id,
            instrument:     position.instrument.clone(),
            direction:      position.direction,
            entry_price:    position.entry_price.clone(),
            stop_loss:      position.stop_loss.clone(),
            take_profit:    position.take_profit.clone(),
            share_quantity: position.share_quantity.clone(),
            is_open:        true,
            sequence,
            registered_at:  Utc::now(),
        };
        inner.entries.insert(position.id, registration.clone());

        debug!(position_id = %position.id, %account_id, sequence, "registered");
        Ok(registration)
    }

    /// Removes the registration and hands back its final (closed) copy.
    ///
    /// A registration owned by a different account is treated as absent.
    pub async fn unregister(
        &self,
        account_id:  Uuid,
        position_id: Uuid,
    ) -> Result<OpenRegistration, PositionError> {
        let mut inner = self.inner.write().await;

        let owned = inner
            .entries
            .get(&position_id)
            .is_some_and(|r| r.account_id == account_id);
        if !owned {
            return Err(PositionError::NotFound(format!(
                "no open registration for position {position_id}"
            )));
        }

        let mut registration = inner
            .entries
            .remove(&position_id)
            .ok_or_else(|| PositionError::NotFound(format!("position {position_id}")))?;
        registration.is_open = false;

        debug!(%position_id, %account_id, "unregistered");
        Ok(registration)
    }

    /// Point-in-time copy, in registration order.
    pub async fn snapshot(&self) -> Vec<OpenRegistration> {
        let mut entries: Vec<OpenRegistration> = {
            let inner = self.inner.read().await;
            inner.entries.values().cloned().collect()
        };
        entries.sort_by_key(|r| r.sequence);
        entries
    }

    #[cfg(test)]
    pub async fn contains(&self, position_id: Uuid) -> bool {
        self.inner.read().await.entries.contains_key(&position_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
