// crates/server/src/lib.rs
//! co11y server library.
//!
//! Axum HTTP server for the live agent-session dashboard: a push stream of
//! session snapshots and lifecycle events, a hook ingest endpoint, and REST
//! lookups over the projects directory.

pub mod config;
pub mod error;
pub mod live;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::*;
pub use live::hub::{BroadcastHub, HubConfig};
pub use crate::metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes plus `/metrics`
/// - CORS for development (allows any origin)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    create_app_with_cors(state, cors)
}

/// Same as [`create_app`] with a caller-supplied CORS policy.
pub fn create_app_with_cors(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Router Tests
// ============================================================================
