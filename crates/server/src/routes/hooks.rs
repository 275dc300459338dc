// crates/server/src/routes/hooks.rs
//! Lifecycle event ingest.
//!
//! Agent hook scripts POST one JSON object per event. Accepted events land in
//! the hub's ring buffer and are pushed to every connected dashboard.
//! `GET /hooks/config` hands out the hook settings that produce those posts.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use co11y_core::parse_hook_event;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_PORT;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Extra fields each event type forwards, as `(json key, jq expression)`.
/// Base fields (`type`, `sessionId`, `timestamp`, `cwd`) are always sent.
const HOOK_FIELDS: [(&str, &[(&str, &str)]); 4] = [
    ("SessionStart", &[("slug", ".slug"), ("gitBranch", ".git_branch")]),
    (
        "SessionEnd",
        &[
            ("gitBranch", ".git_branch"),
            ("messageCount", ".message_count"),
            ("duration", ".duration"),
        ],
    ),
    (
        "PreToolUse",
        &[
            ("gitBranch", ".git_branch"),
            ("toolName", ".tool_name"),
            ("toolInput", ".tool_input"),
            ("messageUuid", ".message_uuid"),
        ],
    ),
    (
        "PostToolUse",
        &[
            ("gitBranch", ".git_branch"),
            ("toolName", ".tool_name"),
            ("toolOutput", ".tool_output"),
            ("success", ".success"),
            ("duration", ".duration"),
            ("messageUuid", ".message_uuid"),
        ],
    ),
];

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HookAck {
    pub success: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct HooksConfigQuery {
    /// Webhook URL the generated commands post to.
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HookCommand {
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HookMatcher {
    pub matcher: String,
    pub hooks: Vec<HookCommand>,
}

/// Drop-in `hooks` block for the agent's settings file.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HooksConfiguration {
    pub hooks: BTreeMap<String, Vec<HookMatcher>>,
}

fn default_webhook_url() -> String {
    format!("http://localhost:{DEFAULT_PORT}/api/hooks/event")
}

/// Shell pipeline turning the hook's stdin JSON into one event POST.
fn hook_command(event_type: &str, fields: &[(&str, &str)], webhook_url: &str) -> String {
    let mut body = format!(
        "  type: \"{event_type}\",\n  sessionId: .session_id,\n  timestamp: (now | todate),\n  cwd: .cwd"
    );
    for (key, expr) in fields {
        body.push_str(&format!(",\n  {key}: {expr}"));
    }
    format!(
        "cat | jq -c '{{\n{body}\n}}' | curl -X POST -H \"Content-Type: application/json\" -d @- {webhook_url} -s -o /dev/null"
    )
}

pub fn hooks_configuration(webhook_url: &str) -> HooksConfiguration {
    let hooks = HOOK_FIELDS
        .iter()
        .map(|(event_type, fields)| {
            let matcher = HookMatcher {
                matcher: ".*".to_string(),
                hooks: vec![HookCommand {
                    kind: "command".to_string(),
                    command: hook_command(event_type, fields, webhook_url),
                }],
            };
            (event_type.to_string(), vec![matcher])
        })
        .collect();
    HooksConfiguration { hooks }
}

/// GET /api/hooks/config - Hook settings that forward lifecycle events here.
pub async fn get_hooks_config(Query(query): Query<HooksConfigQuery>) -> Json<HooksConfiguration> {
    let url = query.url.unwrap_or_else(default_webhook_url);
    Json(hooks_configuration(&url))
}

/// POST /api/hooks/event - Validate and ingest one lifecycle event.
///
/// The body is read raw so malformed JSON gets our error shape rather than
/// axum's rejection text.
pub async fn ingest_hook_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<HookAck>> {
    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidJson(e.to_string()))?;
    let event = parse_hook_event(payload)?;

    tracing::debug!(
        event_type = event.kind(),
        session_id = %event.session_id(),
        "Hook event accepted"
    );
    state.hub.ingest(event);

    Ok(Json(HookAck { success: true }))
}

/// Create the hook ingest router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/hooks/event", post(ingest_hook_event))
        .route("/hooks/config", get(get_hooks_config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::live::hub::{BroadcastHub, HubConfig};

    async fn post_json(app: Router, body: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/hooks/event")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_hooks_configuration_covers_every_event_type() {
        let config = hooks_configuration("http://localhost:3001/api/hooks/event");
        let kinds: Vec<&str> = config.hooks.keys().map(String::as_str).collect();
        assert_eq!(kinds, vec!["PostToolUse", "PreToolUse", "SessionEnd", "SessionStart"]);

        for matchers in config.hooks.values() {
            assert_eq!(matchers.len(), 1);
            assert_eq!(matchers[0].matcher, ".*");
            let hook = &matchers[0].hooks[0];
            assert_eq!(hook.kind, "command");
            assert!(hook.command.contains("-X POST"));
            assert!(hook.command.contains(r#"-H "Content-Type: application/json""#));
            assert!(hook.command.contains("http://localhost:3001/api/hooks/event"));
            assert!(hook.command.contains("sessionId: .session_id"));
        }

        let post = &config.hooks["PostToolUse"][0].hooks[0].command;
        for field in ["toolOutput", "success", "duration", "messageUuid"] {
            assert!(post.contains(field), "missing {field}");
        }
    }

    #[tokio::test]
    async fn test_config_uses_requested_url() {
        let hub = BroadcastHub::new("/nonexistent", HubConfig::default());
        let app = router().with_state(AppState::new(hub));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/hooks/config?url=http://127.0.0.1:9999/api/hooks/event")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let config: HooksConfiguration = serde_json::from_slice(&body).unwrap();
        let command = &config.hooks["SessionStart"][0].hooks[0].command;
        assert!(command.contains("http://127.0.0.1:9999/api/hooks/event"));
        assert!(command.contains("slug: .slug"));
    }

    #[tokio::test]
    async fn test_valid_event_lands_in_backlog() {
        let hub = BroadcastHub::new("/nonexistent", HubConfig::default());
        let state = AppState::new(hub.clone());
        let app = router().with_state(state);

        let (status, body) = post_json(
            app,
            r#"{"type":"PreToolUse","sessionId":"s1","timestamp":"2026-03-01T12:00:00Z","cwd":"/w","toolName":"Bash","toolInput":{"command":"ls"},"messageUuid":"m1"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"success":true}"#);
        let backlog = hub.event_backlog();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].tool_name(), Some("Bash"));
    }

    #[tokio::test]
    async fn test_rejected_event_is_not_ingested() {
        let hub = BroadcastHub::new("/nonexistent", HubConfig::default());
        let app = router().with_state(AppState::new(hub.clone()));

        let (status, body) = post_json(
            app,
            r#"{"type":"SessionEnd","sessionId":"s1","timestamp":"t","cwd":"/w","messageCount":"3","duration":1}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("messageCount"));
        assert!(hub.event_backlog().is_empty());
    }
}
