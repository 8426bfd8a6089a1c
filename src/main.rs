//! # Position Service: Position Lifecycle Coordinator
//!
//! ```text
//!  ┌─────────────┐  POST   /api/positions      ┌──────────────────────────────┐
//!  │  Client     │ ──────────────────────────▶ │ PositionService              │
//!  └─────────────┘  DELETE /api/positions/:id  │ ├─ PositionStore   (pg/mem)  │
//!                                              │ ├─ BalanceCustody  (http/mem)│
//!  ┌─────────────┐  every MONITOR_INTERVAL_MS  │ ├─ PriceFeed       (ws/mem)  │
//!  │  Monitor    │ ──────────────────────────▶ │ ├─ PositionRegistry          │
//!  └─────────────┘  close on SL / TP           │ └─ broadcast_tx ───────────┐ │
//!                                              └────────────────────────────┘ │
//!  ┌─────────────┐  ws://host/ws/monitor  ◀────────────────────────────────── ┘
//!  │  Dashboard  │  GET /api/monitor/open
//!  └─────────────┘
//! ```

use std::net::SocketAddr;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod auth;
mod collaborators;
mod config;
#[cfg(feature = "postgres")]
mod db;
mod decimal;
mod engine;
mod error;
mod events;
mod models;
mod registry;
mod routes;
mod state;

use auth::require_api_key;
use config::Config;
use engine::PositionMonitor;
use routes::{
    monitor::{get_open_positions, ws_monitor},
    positions::{close_position, health_check, list_positions, open_position},
};
use state::build_state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("position_service=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║          POSITION SERVICE — Lifecycle Core            ║
  ║     Open · Close · Registry · SL/TP Monitor           ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config & collaborators ─────────────────────────────────────────────
    let config = Config::from_env();
    if !config.auth_enabled() {
        warn!("API_KEY not set — running without authentication");
    }

    let http_client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;
    let collaborators = collaborators::build(&config, http_client).await?;

    // ── 4. Shared state + registry restore ────────────────────────────────────
    let state = build_state(collaborators, &config);
    state.service.restore_open_positions().await?;

    // ── 5. Monitor ────────────────────────────────────────────────────────────
    let monitor = PositionMonitor::new(state.service.clone(), config.monitor_interval).spawn();

    // ── 6. CORS ───────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 7. Router ─────────────────────────────────────────────────────────────
    let app = Router::new()
        // ── Positions ─────────────────────────────────────────────────────────
        .route("/api/positions",     post(open_position))
        .route("/api/positions",     get(list_positions))
        .route("/api/positions/:id", delete(close_position))
        // ── Monitor ───────────────────────────────────────────────────────────
        .route("/ws/monitor",        get(ws_monitor))
        .route("/api/monitor/open",  get(get_open_positions))
        .route("/health",            get(health_check))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    // ── 8. Bind & Serve ───────────────────────────────────────────────────────
    let addr: SocketAddr = config.bind_addr.parse()?;

    info!(?addr, "🚀 Position service starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── 9. Drain ──────────────────────────────────────────────────────────────
    monitor.stop().await;
    info!("👋 Position service stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
