//! API route handlers for the co11y server.

pub mod events;
pub mod health;
pub mod hooks;
pub mod metrics;
pub mod projects;
pub mod sessions;
pub mod stats;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router: API routes under `/api`, plus `/metrics`.
///
/// Routes:
/// - GET  /api/health - Health check
/// - GET  /api/events - SSE push stream (heartbeat, hook, sessions frames)
/// - POST /api/hooks/event - Ingest one lifecycle event
/// - GET  /api/hooks/config - Agent hook settings pointing at this server
/// - GET  /api/sessions - Full snapshot (`?active=true` for active only)
/// - GET  /api/sessions/:id - One session with its transcript
/// - GET  /api/sessions/:id/subagents - Subagents of one session
/// - GET  /api/projects/:id - One project
/// - GET  /api/stats - Usage totals from the stats cache
/// - GET  /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", events::router())
        .nest("/api", hooks::router())
        .nest("/api", sessions::router())
        .nest("/api", projects::router())
        .nest("/api", stats::router())
        .merge(metrics::router())
        .with_state(state)
}
