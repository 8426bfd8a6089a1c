//! # engine::monitor
//!
//! **Monitoring Loop**: background task that closes positions whose price
//! crossed a stop-loss or take-profit.
//!
//! ## Tick
//! ```text
//! interval ─▶ snapshot() ─▶ for each registration:
//!                              get_position ─▶ quote ─▶ close_trigger?
//!                                                         └─▶ close()
//! ```
//! One registration failing never aborts the tick.  Shutdown is checked at the
//! start of every tick and between registrations.

use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::decimal;
use crate::engine::orchestrator::PositionService;
use crate::error::PositionError;
use crate::events::WsEvent;
use crate::models::{CloseReason, Direction};
use crate::registry::OpenRegistration;

// ─── Trigger Rule ─────────────────────────────────────────────────────────────

/// Direction-aware threshold check.  Stop-loss wins when both would fire.
///
/// | Direction | Stop-loss          | Take-profit          |
/// |-----------|--------------------|----------------------|
/// | Long      | `price <= stop`    | `price >= target`    |
/// | Short     | `price >= stop`    | `price <= target`    |
pub fn close_trigger(
    direction:   Direction,
    price:       &BigDecimal,
    stop_loss:   Option<&BigDecimal>,
    take_profit: Option<&BigDecimal>,
) -> Option<CloseReason> {
    let (hit_stop, hit_target) = match direction {
        Direction::Long => (
            stop_loss.is_some_and(|sl| price <= sl),
            take_profit.is_some_and(|tp| price >= tp),
        ),
        Direction::Short => (
            stop_loss.is_some_and(|sl| price >= sl),
            take_profit.is_some_and(|tp| price <= tp),
        ),
    };

    if hit_stop {
        Some(CloseReason::StopLoss)
    } else if hit_target {
        Some(CloseReason::TakeProfit)
    } else {
        None
    }
}

// ─── Scan Result ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned:   usize,
    pub triggered: usize,
    /// Registrations that could not be evaluated or closed this tick.
    pub skipped:   usize,
}

enum Outcome {
    Held,
    Closed,
    Skipped,
}

// ─── Handle ───────────────────────────────────────────────────────────────────

pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    task:        JoinHandle<()>,
}

impl MonitorHandle {
    /// Asks the loop to stop; it exits within one tick.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Monitor task ended abnormally");
        }
    }

    pub async fn stop(self) {
        self.shutdown();
        self.join().await;
    }
}

// ─── Monitor ──────────────────────────────────────────────────────────────────

pub struct PositionMonitor {
    service:  Arc<PositionService>,
    interval: Duration,
}

impl PositionMonitor {
    pub fn new(service: Arc<PositionService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    pub fn spawn(self) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        MonitorHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "👁️ Position monitor started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    let summary = self.scan(&shutdown).await;
                    if summary.scanned > 0 {
                        debug!(
                            scanned   = summary.scanned,
                            triggered = summary.triggered,
                            skipped   = summary.skipped,
                            "Monitor tick"
                        );
                    }
                    self.service.publish_event(&WsEvent::MonitorStats {
                        scanned:   summary.scanned,
                        triggered: summary.triggered,
                        skipped:   summary.skipped,
                    });
                }
                changed = shutdown.changed() => {
                    // Sender dropped counts as shutdown too.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("🛑 Position monitor stopped");
    }

    /// One pass over a registry snapshot.
    pub async fn scan(&self, shutdown: &watch::Receiver<bool>) -> ScanSummary {
        let registrations = self.service.open_registrations().await;
        let mut summary = ScanSummary::default();

        for registration in &registrations {
            if *shutdown.borrow() {
                debug!("Shutdown requested mid-scan");
                break;
            }

            summary.scanned += 1;
            match self.evaluate(registration).await {
                Outcome::Held => {}
                Outcome::Closed => summary.triggered += 1,
                Outcome::Skipped => summary.skipped += 1,
            }
        }

        summary
    }

    async fn evaluate(&self, registration: &OpenRegistration) -> Outcome {
        let position_id = registration.position_id;

        // ── 1. Stored record (thresholds as persisted) ────────────────────────
        let position = match self.service.fetch_position(position_id).await {
            Ok(p) => p,
            Err(PositionError::NotFound(_)) => {
                debug!(%position_id, "Position gone before evaluation");
                return Outcome::Skipped;
            }
            Err(e) => {
                warn!(%position_id, error = %e, "Could not load position");
                return Outcome::Skipped;
            }
        };

        // ── 2. Fresh quote ────────────────────────────────────────────────────
        let quote = match self.service.fetch_quote(&position.instrument).await {
            Ok(q) => q,
            Err(e) => {
                warn!(%position_id, instrument = %position.instrument, error = %e, "No quote, skipping");
                return Outcome::Skipped;
            }
        };

        // ── 3. Rule ───────────────────────────────────────────────────────────
        let Some(reason) = close_trigger(
            position.direction,
            &quote.price,
            position.stop_loss.as_ref(),
            position.take_profit.as_ref(),
        ) else {
            return Outcome::Held;
        };

        info!(
            %position_id,
            instrument = %position.instrument,
            price      = %quote.price,
            reason     = ?reason,
            "🎯 Threshold crossed — closing"
        );
        self.service.publish_event(&WsEvent::ThresholdTriggered {
            position_id,
            instrument: position.instrument.clone(),
            price:      decimal::to_f64(&quote.price),
            reason,
        });

        // ── 4. Close ──────────────────────────────────────────────────────────
        match self.service.close(position_id, reason).await {
            Ok(_) => Outcome::Closed,
            Err(PositionError::NotFound(_)) => {
                debug!(%position_id, "Already closed elsewhere");
                Outcome::Skipped
            }
            Err(e) => {
                warn!(%position_id, error = %e, "Triggered close failed");
                Outcome::Skipped
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::orchestrator::tests::{dec, Harness};

    fn long(price: &str) -> Option<CloseReason> {
        close_trigger(
            Direction::Long,
            &dec(price),
            Some(&dec("45.00")),
            Some(&dec("60.00")),
        )
    }

    fn short(price: &str) -> Option<CloseReason> {
        close_trigger(
            Direction::Short,
            &dec(price),
            Some(&dec("60.00")),
            Some(&dec("45.00")),
        )
    }

    #[test]
    fn test_long_rule() {
        assert_eq!(long("44.99"), Some(CloseReason::StopLoss));
        assert_eq!(long("45.00"), Some(CloseReason::StopLoss));
        assert_eq!(long("60.01"), Some(CloseReason::TakeProfit));
        assert_eq!(long("50.00"), None);
    }

    #[test]
    fn test_short_rule() {
        assert_eq!(short("60.01"), Some(CloseReason::StopLoss));
        assert_eq!(short("44.99"), Some(CloseReason::TakeProfit));
        assert_eq!(short("50.00"), None);
    }

    #[test]
    fn test_missing_thresholds_never_fire() {
        assert_eq!(close_trigger(Direction::Long, &dec("0.01"), None, None), None);
        assert_eq!(
            close_trigger(Direction::Short, &dec("1.00"), Some(&dec("2.00")), None),
            None
        );
    }

    fn idle() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Receiver keeps the last value after the sender is gone.
        drop(tx);
        rx
    }

    #[tokio::test]
    async fn test_scan_closes_on_stop_loss() {
        let h = Harness::new("1000.00").await;
        let position = h.service.open(h.order("1000.00")).await.unwrap();
        let monitor = PositionMonitor::new(h.service.clone(), Duration::from_millis(10));

        let summary = monitor.scan(&idle()).await;
        assert_eq!(summary, ScanSummary { scanned: 1, triggered: 0, skipped: 0 });
        assert!(h.registry.contains(position.id).await);

        h.prices.set_price("AAPL", dec("44.99")).await;
        let summary = monitor.scan(&idle()).await;
        assert_eq!(summary.triggered, 1);
        assert_eq!(h.registry.len().await, 0);
        assert_eq!(h.store.len().await, 0);
        assert_eq!(h.available().await, dec("899.80"));
    }

    #[tokio::test]
    async fn test_scan_closes_on_take_profit() {
        let h = Harness::new("1000.00").await;
        h.service.open(h.order("1000.00")).await.unwrap();
        h.prices.set_price("AAPL", dec("60.01")).await;

        let monitor = PositionMonitor::new(h.service.clone(), Duration::from_millis(10));
        let summary = monitor.scan(&idle()).await;

        assert_eq!(summary.triggered, 1);
        assert_eq!(h.available().await, dec("1200.20"));
    }

    #[tokio::test]
    async fn test_scan_skips_failures_and_continues() {
        let h = Harness::new("1000.00").await;
        let first = h.service.open(h.order("100.00")).await.unwrap();
        h.service.open(h.order("100.00")).await.unwrap();

        // A registration whose record vanished is skipped, the other still closes.
        let store: &dyn crate::collaborators::PositionStore = h.store.as_ref();
        store.delete_position(first.id).await.unwrap();
        h.prices.set_price("AAPL", dec("44.00")).await;

        let monitor = PositionMonitor::new(h.service.clone(), Duration::from_millis(10));
        let summary = monitor.scan(&idle()).await;

        assert_eq!(summary, ScanSummary { scanned: 2, triggered: 1, skipped: 1 });
    }

    #[tokio::test]
    async fn test_scan_stops_when_shutdown_requested() {
        let h = Harness::new("1000.00").await;
        h.service.open(h.order("100.00")).await.unwrap();

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let monitor = PositionMonitor::new(h.service.clone(), Duration::from_millis(10));
        assert_eq!(monitor.scan(&rx).await.scanned, 0);
    }

    #[tokio::test]
    async fn test_spawned_loop_triggers_and_stops() {
        let h = Harness::new("1000.00").await;
        h.service.open(h.order("1000.00")).await.unwrap();
        h.prices.set_price("AAPL", dec("61.00")).await;

        let handle = PositionMonitor::new(h.service.clone(), Duration::from_millis(10)).spawn();

        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            while h.registry.len().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(closed.is_ok(), "monitor never closed the position");

        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("monitor did not stop in time");
    }
}
