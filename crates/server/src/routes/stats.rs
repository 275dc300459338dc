// crates/server/src/routes/stats.rs
//! Usage statistics endpoint.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use co11y_core::{load_stats, StatsResponse};

use crate::state::AppState;

/// GET /api/stats - Totals from the agent's stats cache. Never fails: a
/// missing or malformed cache reads as zeroed stats.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = load_stats(&state.stats_path(), Utc::now().date_naive()).await;
    Json(StatsResponse { stats })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/stats", get(get_stats))
}
