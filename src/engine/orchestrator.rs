//! # engine::orchestrator
//!
//! **Position Service**: sequences the registry, the three collaborators and
//! the decimal engine into `open` and `close`.
//!
//! ## Open
//! ```text
//! 1. get_balance           ─┐
//! 2. check_balance          │ nothing mutated yet → plain errors
//! 3. subscribe → quote      │
//! 4. share_quantity        ─┘
//! 5. create_position       ← store
//! 6. register              ← registry   (fails ⇒ InternalInconsistency)
//! 7. update_balance(debit) ← ledger     (fails ⇒ InternalInconsistency)
//! ```
//!
//! ## Close
//! ```text
//! 1. get_position          (absent ⇒ NotFound)
//! 2. unregister            (absent ⇒ NotFound, already closed)
//! 3. get_balance + quote   ─┐ failure here puts the registration back
//! 4. settle                ─┘
//! 5. update_balance(credit)  (fails ⇒ InternalInconsistency, stays closed)
//! 6. delete_position       (fails ⇒ InternalInconsistency)
//! ```
//!
//! ## Ledger serialization
//! `update_balance` overwrites the whole balance, so every read-modify-write
//! of one account (open steps 1–7, close steps 3–5) runs under that account's
//! lock.  The registry lock is never held while waiting on it.
//!
//! There is no transaction across collaborators and no compensation: a
//! half-finished sequence is reported as `InternalInconsistency`, logged with
//! position id, account id and step.

use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::collaborators::{BalanceCustody, Collaborators, PositionStore, PriceFeed};
use crate::decimal;
use crate::error::{CollaboratorError, PositionError};
use crate::events::WsEvent;
use crate::models::{Balance, CloseReason, OpenOrder, Position, Quote};
use crate::registry::{OpenRegistration, PositionRegistry};

// ─── Close Result ─────────────────────────────────────────────────────────────

/// What a successful close realized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedPosition {
    pub position_id:   Uuid,
    pub account_id:    Uuid,
    pub instrument:    String,
    pub reason:        CloseReason,
    pub close_price:   BigDecimal,
    pub current_value: BigDecimal,
    pub pnl_percent:   BigDecimal,
    pub absolute_pnl:  BigDecimal,
    pub new_balance:   BigDecimal,
}

// ─── Error Mapping ────────────────────────────────────────────────────────────

fn store_error(err: CollaboratorError, position_id: Uuid) -> PositionError {
    match err {
        CollaboratorError::NotFound(_) => PositionError::NotFound(format!("position {position_id}")),
        other => PositionError::CollaboratorUnavailable {
            collaborator: "position store",
            reason:       other.to_string(),
        },
    }
}

fn balance_error(err: CollaboratorError, account_id: Uuid) -> PositionError {
    match err {
        CollaboratorError::NotFound(_) => PositionError::NotFound(format!("account {account_id}")),
        other => PositionError::CollaboratorUnavailable {
            collaborator: "balance custody",
            reason:       other.to_string(),
        },
    }
}

fn quote_error(err: CollaboratorError, instrument: &str) -> PositionError {
    PositionError::QuoteUnavailable {
        instrument: instrument.to_string(),
        reason:     err.to_string(),
    }
}

// ─── PositionService ──────────────────────────────────────────────────────────

pub struct PositionService {
    store:    Arc<dyn PositionStore>,
    balances: Arc<dyn BalanceCustody>,
    prices:   Arc<dyn PriceFeed>,
    registry: Arc<PositionRegistry>,
    events:   broadcast::Sender<String>,
    /// One ledger lock per account, created on first use.
    accounts: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PositionService {
    pub fn new(
        collaborators: Collaborators,
        registry:      Arc<PositionRegistry>,
        events:        broadcast::Sender<String>,
    ) -> Self {
        Self {
            store:    collaborators.store,
            balances: collaborators.balances,
            prices:   collaborators.prices,
            registry,
            events,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_account(&self, account_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut accounts = self.accounts.lock().await;
            accounts.entry(account_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Never fails when nobody is listening.
    pub fn publish_event(&self, event: &WsEvent) {
        let _ = self.events.send(event.to_json());
    }

    fn inconsistency(
        &self,
        position_id: Uuid,
        account_id:  Uuid,
        step:        &'static str,
        reason:      String,
    ) -> PositionError {
        error!(
            %position_id,
            %account_id,
            step,
            reason = %reason,
            "⛔ INTERNAL INCONSISTENCY — manual reconciliation required"
        );
        self.publish_event(&WsEvent::Inconsistency {
            position_id,
            account_id,
            step: step.to_string(),
            reason: reason.clone(),
        });
        PositionError::InternalInconsistency { position_id, account_id, step, reason }
    }

    // ─── Reads ────────────────────────────────────────────────────────────────

    pub async fn fetch_position(&self, position_id: Uuid) -> Result<Position, PositionError> {
        self.store
            .get_position(position_id)
            .await
            .map_err(|e| store_error(e, position_id))
    }

    /// First quote of a fresh subscription for `instrument`.
    pub async fn fetch_quote(&self, instrument: &str) -> Result<Quote, PositionError> {
        let quote = self
            .prices
            .subscribe(&[instrument.to_string()])
            .await
            .map_err(|e| quote_error(e, instrument))?;

        if !decimal::is_positive(&quote.price) {
            return Err(PositionError::QuoteUnavailable {
                instrument: instrument.to_string(),
                reason:     format!("non-positive price {}", quote.price),
            });
        }
        Ok(quote)
    }

    pub async fn list_positions(&self, account_id: Uuid) -> Result<Vec<Position>, PositionError> {
        self.store
            .list_positions(account_id)
            .await
            .map_err(|e| PositionError::CollaboratorUnavailable {
                collaborator: "position store",
                reason:       e.to_string(),
            })
    }

    pub async fn open_registrations(&self) -> Vec<OpenRegistration> {
        self.registry.snapshot().await
    }

    // ─── Startup ──────────────────────────────────────────────────────────────

    /// Re-registers every stored position so open ⇔ stored ∧ registered holds
    /// after a restart.  Returns how many were restored.
    pub async fn restore_open_positions(&self) -> Result<usize, PositionError> {
        let positions = self.store.list_all_positions().await.map_err(|e| {
            PositionError::CollaboratorUnavailable {
                collaborator: "position store",
                reason:       e.to_string(),
            }
        })?;

        let mut restored = 0;
        for position in &positions {
            match self.registry.register(position.account_id, position).await {
                Ok(_) => restored += 1,
                Err(PositionError::DuplicateRegistration(_)) => {
                    debug!(position_id = %position.id, "Already registered");
                }
                Err(e) => return Err(e),
            }
        }

        info!(restored, stored = positions.len(), "📂 Open positions restored");
        Ok(restored)
    }

    // ─── Open ─────────────────────────────────────────────────────────────────

    pub async fn open(&self, order: OpenOrder) -> Result<Position, PositionError> {
        let OpenOrder {
            account_id,
            instrument,
            direction,
            funds,
            stop_loss,
            take_profit,
        } = order;

        let _ledger = self.lock_account(account_id).await;

        // ── 1. Balance ────────────────────────────────────────────────────────
        let balance = self
            .balances
            .get_balance(account_id)
            .await
            .map_err(|e| balance_error(e, account_id))?;

        // ── 2. Funds check ────────────────────────────────────────────────────
        let remaining = decimal::check_balance(&balance.available, &funds)?;

        // ── 3. Quote ──────────────────────────────────────────────────────────
        let quote = self.fetch_quote(&instrument).await?;

        // ── 4. Sizing ─────────────────────────────────────────────────────────
        let share_quantity = decimal::share_quantity(&funds, &quote.price)?;
        if !decimal::is_positive(&share_quantity) {
            return Err(PositionError::InvalidQuantity(format!(
                "{funds} buys less than 0.0001 shares at {}",
                quote.price
            )));
        }

        let position = Position {
            id: Uuid::new_v4(),
            account_id,
            direction,
            instrument,
            entry_price: quote.price,
            total: decimal::round(&funds, decimal::MONEY_SCALE),
            share_quantity,
            stop_loss,
            take_profit,
            opened_at: Utc::now(),
        };

        // ── 5. Persist ────────────────────────────────────────────────────────
        match self.store.create_position(&position).await {
            Ok(()) => {}
            Err(CollaboratorError::Conflict(reason)) => {
                return Err(self.inconsistency(position.id, account_id, "persist_position", reason));
            }
            Err(e) => return Err(store_error(e, position.id)),
        }

        // ── 6. Register ───────────────────────────────────────────────────────
        if let Err(e) = self.registry.register(account_id, &position).await {
            return Err(self.inconsistency(position.id, account_id, "register", e.to_string()));
        }

        // ── 7. Debit ──────────────────────────────────────────────────────────
        let debited = balance.with_available(remaining);
        if let Err(e) = self.balances.update_balance(&debited).await {
            return Err(self.inconsistency(position.id, account_id, "debit_balance", e.to_string()));
        }

        info!(
            position_id    = %position.id,
            %account_id,
            instrument     = %position.instrument,
            direction      = ?position.direction,
            entry_price    = %position.entry_price,
            share_quantity = %position.share_quantity,
            total          = %position.total,
            "📈 Position opened"
        );
        self.publish_event(&WsEvent::PositionOpened { position: Box::new(position.clone()) });

        Ok(position)
    }

    // ─── Close ────────────────────────────────────────────────────────────────

    pub async fn close(
        &self,
        position_id: Uuid,
        reason:      CloseReason,
    ) -> Result<ClosedPosition, PositionError> {
        // ── 1. Stored record ──────────────────────────────────────────────────
        let position = self.fetch_position(position_id).await?;
        let account_id = position.account_id;

        // ── 2. Unregister (monitor can no longer act on it) ───────────────────
        self.registry.unregister(account_id, position_id).await?;

        let ledger = self.lock_account(account_id).await;

        // ── 3–4. Price and settle ─────────────────────────────────────────────
        let (balance, quote, settlement) = match self.price_and_settle(&position).await {
            Ok(done) => done,
            Err(err) => {
                // Ledger untouched: the position is still open.
                if let Err(e) = self.registry.register(account_id, &position).await {
                    warn!(%position_id, error = %e, "Could not restore registration");
                }
                warn!(%position_id, %account_id, error = %err, "Close aborted, position kept open");
                return Err(err);
            }
        };

        // ── 5. Credit ─────────────────────────────────────────────────────────
        // A failed or timed-out write may still have landed; never re-open.
        let credited = balance.with_available(settlement.new_balance.clone());
        if let Err(e) = self.balances.update_balance(&credited).await {
            return Err(self.inconsistency(position_id, account_id, "credit_balance", e.to_string()));
        }
        drop(ledger);

        // ── 6. Delete ─────────────────────────────────────────────────────────
        if let Err(e) = self.store.delete_position(position_id).await {
            return Err(self.inconsistency(position_id, account_id, "delete_position", e.to_string()));
        }

        let closed = ClosedPosition {
            position_id,
            account_id,
            instrument:    position.instrument,
            reason,
            close_price:   quote.price,
            current_value: settlement.current_value,
            pnl_percent:   settlement.pnl_percent,
            absolute_pnl:  settlement.absolute_pnl,
            new_balance:   settlement.new_balance,
        };

        info!(
            %position_id,
            %account_id,
            instrument   = %closed.instrument,
            close_price  = %closed.close_price,
            pnl_percent  = %closed.pnl_percent,
            absolute_pnl = %closed.absolute_pnl,
            reason       = ?reason,
            "📉 Position closed"
        );
        self.publish_event(&WsEvent::PositionClosed {
            position_id,
            account_id,
            instrument:   closed.instrument.clone(),
            close_price:  decimal::to_f64(&closed.close_price),
            pnl_percent:  decimal::to_f64(&closed.pnl_percent),
            absolute_pnl: decimal::to_f64(&closed.absolute_pnl),
            close_reason: reason,
        });

        Ok(closed)
    }

    async fn price_and_settle(
        &self,
        position: &Position,
    ) -> Result<(Balance, Quote, decimal::Settlement), PositionError> {
        let balance: Balance = self
            .balances
            .get_balance(position.account_id)
            .await
            .map_err(|e| balance_error(e, position.account_id))?;
        let quote = self.fetch_quote(&position.instrument).await?;

        let settlement = decimal::settle(
            &position.total,
            &position.share_quantity,
            &quote.price,
            &balance.available,
        )?;

        Ok((balance, quote, settlement))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use std::str::FromStr;
    use std::time::Duration;

    use super::*;
    use crate::collaborators::{InMemoryBalanceCustody, InMemoryPositionStore, StaticPriceFeed};
    use crate::models::Direction;

    pub(crate) fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    pub(crate) struct Harness {
        pub service:  Arc<PositionService>,
        pub store:    Arc<InMemoryPositionStore>,
        pub balances: Arc<InMemoryBalanceCustody>,
        pub prices:   Arc<StaticPriceFeed>,
        pub registry: Arc<PositionRegistry>,
        pub events:   broadcast::Receiver<String>,
        pub account:  Uuid,
    }

    impl Harness {
        pub(crate) async fn new(available: &str) -> Self {
            let store = Arc::new(InMemoryPositionStore::new());
            let balances = Arc::new(InMemoryBalanceCustody::new());
            let prices = Arc::new(StaticPriceFeed::new());
            let registry = Arc::new(PositionRegistry::new());
            let (tx, events) = broadcast::channel(64);

            let account = Uuid::new_v4();
            balances.seed(account, dec(available)).await;
            prices.set_price("AAPL", dec("50.00")).await;

            let collaborators = Collaborators {
                store:    store.clone(),
                balances: balances.clone(),
                prices:   prices.clone(),
            };
            let service = Arc::new(PositionService::new(collaborators, registry.clone(), tx));

            Self { service, store, balances, prices, registry, events, account }
        }

        pub(crate) fn order(&self, funds: &str) -> OpenOrder {
            OpenOrder {
                account_id:  self.account,
                instrument:  "AAPL".into(),
                direction:   Direction::Long,
                funds:       dec(funds),
                stop_loss:   Some(dec("45.00")),
                take_profit: Some(dec("60.00")),
            }
        }

        pub(crate) async fn available(&self) -> BigDecimal {
            self.balances.get_balance(self.account).await.unwrap().available
        }
    }

    #[tokio::test]
    async fn test_open_persists_registers_and_debits() {
        let h = Harness::new("1500.00").await;

        let position = h.service.open(h.order("1000.00")).await.unwrap();

        assert_eq!(position.share_quantity.to_string(), "20.0000");
        assert_eq!(position.entry_price, dec("50.00"));
        assert_eq!(position.total, dec("1000.00"));
        assert_eq!(h.store.len().await, 1);
        assert_eq!(h.store.get_position(position.id).await.unwrap(), position);
        assert_eq!(h.registry.len().await, 1);
        assert!(h.registry.contains(position.id).await);
        assert_eq!(h.available().await, dec("500.00"));
    }

    #[tokio::test]
    async fn test_open_with_exact_balance() {
        let h = Harness::new("100.00").await;
        h.service.open(h.order("100.00")).await.unwrap();
        assert_eq!(h.available().await, dec("0.00"));
    }

    #[tokio::test]
    async fn test_open_insufficient_funds_touches_nothing() {
        let h = Harness::new("99.99").await;

        let err = h.service.open(h.order("100.00")).await.unwrap_err();

        assert!(matches!(err, PositionError::InsufficientFunds { .. }));
        assert_eq!(h.store.len().await, 0);
        assert_eq!(h.registry.len().await, 0);
        assert_eq!(h.available().await, dec("99.99"));
    }

    #[tokio::test]
    async fn test_open_unknown_account() {
        let h = Harness::new("100.00").await;
        let mut order = h.order("10.00");
        order.account_id = Uuid::new_v4();

        let err = h.service.open(order).await.unwrap_err();
        assert!(matches!(err, PositionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_open_quote_unavailable() {
        let h = Harness::new("1000.00").await;
        h.prices.set_unavailable(true);

        let err = h.service.open(h.order("100.00")).await.unwrap_err();

        assert!(matches!(err, PositionError::QuoteUnavailable { .. }));
        assert!(err.is_retryable());
        assert_eq!(h.store.len().await, 0);
        assert_eq!(h.available().await, dec("1000.00"));
    }

    #[tokio::test]
    async fn test_open_store_down_leaves_funds() {
        let h = Harness::new("1000.00").await;
        h.store.set_unavailable(true);

        let err = h.service.open(h.order("100.00")).await.unwrap_err();

        assert!(matches!(err, PositionError::CollaboratorUnavailable { .. }));
        assert_eq!(h.registry.len().await, 0);
        assert_eq!(h.available().await, dec("1000.00"));
    }

    #[tokio::test]
    async fn test_open_debit_failure_is_inconsistency() {
        let mut h = Harness::new("1000.00").await;
        h.balances.set_fail_updates(true);

        let err = h.service.open(h.order("100.00")).await.unwrap_err();

        match err {
            PositionError::InternalInconsistency { step, account_id, .. } => {
                assert_eq!(step, "debit_balance");
                assert_eq!(account_id, h.account);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Open but unfunded, left for the operator.
        assert_eq!(h.store.len().await, 1);
        assert_eq!(h.registry.len().await, 1);
        assert_eq!(h.available().await, dec("1000.00"));

        let event = h.events.recv().await.unwrap();
        assert!(event.contains("INCONSISTENCY"));
    }

    #[tokio::test]
    async fn test_close_realizes_pnl_and_credits() {
        let h = Harness::new("1000.00").await;
        let position = h.service.open(h.order("1000.00")).await.unwrap();
        assert_eq!(h.available().await, dec("0.00"));

        h.prices.set_price("AAPL", dec("55.00")).await;
        let closed = h.service.close(position.id, CloseReason::Manual).await.unwrap();

        assert_eq!(closed.current_value.to_string(), "1100.00");
        assert_eq!(closed.pnl_percent.to_string(), "10.00");
        assert_eq!(closed.absolute_pnl, dec("100.00"));
        assert_eq!(h.available().await, dec("1100.00"));
        assert_eq!(h.store.len().await, 0);
        assert_eq!(h.registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_double_close_is_not_found() {
        let h = Harness::new("1000.00").await;
        let position = h.service.open(h.order("500.00")).await.unwrap();

        h.service.close(position.id, CloseReason::Manual).await.unwrap();
        let err = h.service.close(position.id, CloseReason::Manual).await.unwrap_err();

        assert!(matches!(err, PositionError::NotFound(_)));
        assert_eq!(h.available().await, dec("1000.00"));
    }

    #[tokio::test]
    async fn test_close_unregistered_record_is_not_found() {
        let h = Harness::new("1000.00").await;
        let position = h.service.open(h.order("500.00")).await.unwrap();
        h.registry.unregister(h.account, position.id).await.unwrap();

        let err = h.service.close(position.id, CloseReason::Manual).await.unwrap_err();

        assert!(matches!(err, PositionError::NotFound(_)));
        assert_eq!(h.store.len().await, 1);
        assert_eq!(h.available().await, dec("500.00"));
    }

    #[tokio::test]
    async fn test_close_quote_failure_keeps_position_open() {
        let h = Harness::new("1000.00").await;
        let position = h.service.open(h.order("500.00")).await.unwrap();
        h.prices.set_unavailable(true);

        let err = h.service.close(position.id, CloseReason::Manual).await.unwrap_err();
        assert!(matches!(err, PositionError::QuoteUnavailable { .. }));
        assert!(h.registry.contains(position.id).await);
        assert_eq!(h.store.len().await, 1);
        assert_eq!(h.available().await, dec("500.00"));

        // Retry succeeds once the feed is back.
        h.prices.set_unavailable(false);
        h.service.close(position.id, CloseReason::Manual).await.unwrap();
        assert_eq!(h.registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_close_delete_failure_is_inconsistency() {
        let h = Harness::new("1000.00").await;
        let position = h.service.open(h.order("500.00")).await.unwrap();
        h.store.set_fail_deletes(true);

        let err = h.service.close(position.id, CloseReason::Manual).await.unwrap_err();

        assert!(matches!(
            err,
            PositionError::InternalInconsistency { step: "delete_position", .. }
        ));
        // Ledger credited, record still present, registration gone.
        assert_eq!(h.available().await, dec("1000.00"));
        assert_eq!(h.store.len().await, 1);
        assert!(!h.registry.contains(position.id).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_close_credits_once() {
        let h = Harness::new("1000.00").await;
        let position = h.service.open(h.order("1000.00")).await.unwrap();

        let a = {
            let service = h.service.clone();
            tokio::spawn(async move { service.close(position.id, CloseReason::Manual).await })
        };
        let b = {
            let service = h.service.clone();
            tokio::spawn(async move { service.close(position.id, CloseReason::StopLoss).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let not_found = results
            .iter()
            .filter(|r| matches!(r, Err(PositionError::NotFound(_))))
            .count();

        assert_eq!(ok, 1);
        assert_eq!(not_found, 1);
        assert_eq!(h.available().await, dec("1000.00"));
    }

    #[tokio::test]
    async fn test_restore_open_positions() {
        let h = Harness::new("1000.00").await;
        let position = h.service.open(h.order("300.00")).await.unwrap();

        // Simulate a restart: fresh registry over the same store.
        let registry = Arc::new(PositionRegistry::new());
        let (tx, _rx) = broadcast::channel(8);
        let restarted = PositionService::new(
            Collaborators {
                store:    h.store.clone(),
                balances: h.balances.clone(),
                prices:   h.prices.clone(),
            },
            registry.clone(),
            tx,
        );

        assert_eq!(restarted.restore_open_positions().await.unwrap(), 1);
        assert!(registry.contains(position.id).await);
        assert_eq!(restarted.restore_open_positions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_events_published() {
        let mut h = Harness::new("1000.00").await;
        let position = h.service.open(h.order("100.00")).await.unwrap();
        h.service.close(position.id, CloseReason::TakeProfit).await.unwrap();

        let opened = h.events.recv().await.unwrap();
        let closed = h.events.recv().await.unwrap();
        assert!(opened.contains("POSITION_OPENED"));
        assert!(closed.contains("POSITION_CLOSED"));
        assert!(closed.contains("TAKE_PROFIT"));
    }

    #[tokio::test]
    async fn test_concurrent_opens_cannot_overspend() {
        let h = Harness::new("1000.00").await;
        h.balances.set_latency(Duration::from_millis(10));

        let (a, b) = tokio::join!(
            h.service.open(h.order("600.00")),
            h.service.open(h.order("600.00")),
        );
        h.balances.set_latency(Duration::ZERO);

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(PositionError::InsufficientFunds { .. })))
                .count(),
            1
        );
        assert_eq!(h.store.len().await, 1);
        assert_eq!(h.available().await, dec("400.00"));
    }

    #[tokio::test]
    async fn test_open_racing_close_keeps_both_ledger_writes() {
        let h = Harness::new("1000.00").await;
        let position = h.service.open(h.order("500.00")).await.unwrap();
        h.balances.set_latency(Duration::from_millis(10));

        let (closed, opened) = tokio::join!(
            h.service.close(position.id, CloseReason::Manual),
            h.service.open(h.order("300.00")),
        );
        h.balances.set_latency(Duration::ZERO);

        closed.unwrap();
        opened.unwrap();
        // 1000 − 500 + 500 − 300
        assert_eq!(h.available().await, dec("700.00"));
    }

    #[tokio::test]
    async fn test_credit_with_lost_response_is_not_retried() {
        let h = Harness::new("1000.00").await;
        let position = h.service.open(h.order("500.00")).await.unwrap();
        h.balances.set_lose_response(true);

        let err = h.service.close(position.id, CloseReason::Manual).await.unwrap_err();
        assert!(matches!(
            err,
            PositionError::InternalInconsistency { step: "credit_balance", .. }
        ));
        assert!(!h.registry.contains(position.id).await);

        h.balances.set_lose_response(false);
        let err = h.service.close(position.id, CloseReason::Manual).await.unwrap_err();
        assert!(matches!(err, PositionError::NotFound(_)));
        assert_eq!(h.available().await, dec("1000.00"));
    }

    #[tokio::test]
    async fn test_close_balance_read_failure_keeps_position_open() {
        let h = Harness::new("1000.00").await;
        let position = h.service.open(h.order("500.00")).await.unwrap();
        h.balances.set_unavailable(true);

        let err = h.service.close(position.id, CloseReason::Manual).await.unwrap_err();
        assert!(matches!(
            err,
            PositionError::CollaboratorUnavailable { collaborator: "balance custody", .. }
        ));
        assert!(h.registry.contains(position.id).await);

        h.balances.set_unavailable(false);
        assert_eq!(h.available().await, dec("500.00"));
        h.service.close(position.id, CloseReason::Manual).await.unwrap();
        assert_eq!(h.available().await, dec("1000.00"));
    }
}
