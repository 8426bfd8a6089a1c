//! # auth: API Key Middleware
//!
//! Guards every endpoint with an `X-API-Key` header.
//!
//! ## Mode
//! - `API_KEY` unset or empty → **allow all** (dev mode)
//! - `API_KEY` set → every request must carry `X-API-Key: <key>`
//!
//! `/health` is always open.

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::state::SharedState;

pub const API_KEY_HEADER: &str = "X-API-Key";

fn is_exempt(path: &str) -> bool {
    path == "/health"
}

pub async fn require_api_key(
    State(state): State<SharedState>,
    request:      Request<Body>,
    next:         Next,
) -> Response {
    // ── Dev mode ──────────────────────────────────────────────────────────────
    if state.api_key.is_empty() || is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided == &*state.api_key {
        next.run(request).await
    } else {
        let path = request.uri().path().to_string();
        warn!(path = %path, "❌ Unauthorized request — invalid or missing X-API-Key");
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "ok":    false,
                "error": "Unauthorized: invalid or missing X-API-Key header",
            })),
        )
            .into_response()
    }
}
