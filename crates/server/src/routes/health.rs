// crates/server/src/routes/health.rs
//! Liveness and hub status for the dashboard backend.
//!
//! Cheap to call: reads counters only, never touches the projects tree.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use ts_rs::TS;

use crate::state::AppState;

#[derive(Debug, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok` while the hub accepts clients, `shutting-down` after shutdown.
    pub status: String,
    pub version: String,
    #[ts(type = "number")]
    pub uptime_secs: u64,
    /// Push clients attached to the event stream.
    pub clients: usize,
    /// Lifecycle events held for replay to new clients.
    pub buffered_events: usize,
    pub projects_dir: String,
}

/// GET /api/health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = if state.hub.is_shutdown() {
        "shutting-down"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        clients: state.hub.client_count(),
        buffered_events: state.hub.event_backlog().len(),
        projects_dir: state.projects_dir().display().to_string(),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::hub::{BroadcastHub, HubConfig};
    use co11y_core::parse_hook_event;
    use serde_json::json;

    #[tokio::test]
    async fn test_health_reports_hub_state() {
        let hub = BroadcastHub::new("/srv/projects", HubConfig::default());
        hub.ingest(
            parse_hook_event(json!({
                "type": "SessionStart",
                "sessionId": "s1",
                "timestamp": "2026-03-01T12:00:00Z",
                "cwd": "/w"
            }))
            .unwrap(),
        );
        let _client = hub.attach();
        let state = AppState::new(hub.clone());

        let Json(health) = health_check(State(state.clone())).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.clients, 1);
        assert_eq!(health.buffered_events, 1);
        assert_eq!(health.projects_dir, "/srv/projects");

        let json = serde_json::to_value(&health).unwrap();
        assert!(json["uptimeSecs"].is_number());
        assert_eq!(json["bufferedEvents"], 1);

        hub.shutdown();
        let Json(health) = health_check(State(state)).await;
        assert_eq!(health.status, "shutting-down");
        assert_eq!(health.clients, 0);
    }
}
