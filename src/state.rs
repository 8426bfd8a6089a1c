//! # state
//!
//! AppState shared by every Axum handler: the position service, the registry
//! it owns and the broadcast channel feeding `/ws/monitor`.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::engine::PositionService;
use crate::registry::PositionRegistry;

/// Events buffered per slow WebSocket client before it starts lagging.
const BROADCAST_CAPACITY: usize = 256;

// ─── AppState ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────────────
    pub service:  Arc<PositionService>,
    pub registry: Arc<PositionRegistry>,

    // ── Monitor / WebSocket ───────────────────────────────────────────────────
    /// Pre-serialized JSON events; see [`crate::events::WsEvent`].
    pub broadcast_tx: broadcast::Sender<String>,

    // ── Auth ──────────────────────────────────────────────────────────────────
    /// Empty → every request is allowed.
    pub api_key: Arc<str>,
}

impl AppState {
    pub fn new(collaborators: Collaborators, config: &Config) -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let registry = Arc::new(PositionRegistry::new());
        let service = Arc::new(PositionService::new(
            collaborators,
            registry.clone(),
            broadcast_tx.clone(),
        ));

        Self {
            service,
            registry,
            broadcast_tx,
            api_key: Arc::from(config.api_key.as_str()),
        }
    }
}

pub type SharedState = Arc<AppState>;

pub fn build_state(collaborators: Collaborators, config: &Config) -> SharedState {
    Arc::new(AppState::new(collaborators, config))
}
