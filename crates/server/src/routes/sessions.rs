// crates/server/src/routes/sessions.rs
//! Session snapshot and detail endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use co11y_core::{
    build_snapshot, session_detail, session_subagents, ProjectsResponse, SessionDetail, Subagent,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Query parameters for GET /api/sessions
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SessionsQuery {
    /// Keep only active sessions, dropping projects left empty.
    pub active: bool,
}

/// Response for GET /api/sessions/:id/subagents
#[derive(Debug, Clone, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct SubagentsResponse {
    pub session_id: String,
    pub subagents: Vec<Subagent>,
}

/// GET /api/sessions - Full snapshot of every project and its sessions.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionsQuery>,
) -> Json<ProjectsResponse> {
    let snapshot = build_snapshot(state.projects_dir(), Utc::now()).await;
    let snapshot = if query.active {
        snapshot.filter_active()
    } else {
        snapshot
    };
    Json(snapshot.into_response())
}

/// GET /api/sessions/:id - One analyzed session with its transcript.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionDetail>> {
    match session_detail(state.projects_dir(), &session_id, Utc::now()).await {
        Ok(detail) => Ok(Json(detail)),
        Err(e) if e.is_not_found() => Err(ApiError::SessionNotFound(session_id)),
        Err(e) => Err(e.into()),
    }
}

/// GET /api/sessions/:id/subagents - Subagents owned by a session.
pub async fn get_session_subagents(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SubagentsResponse>> {
    let subagents = session_subagents(state.projects_dir(), &session_id, Utc::now())
        .await
        .ok_or_else(|| ApiError::SessionNotFound(session_id.clone()))?;
    Ok(Json(SubagentsResponse {
        session_id,
        subagents,
    }))
}

/// Create the sessions routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/subagents", get(get_session_subagents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_query_defaults_off() {
        let query: SessionsQuery = serde_json::from_str("{}").unwrap();
        assert!(!query.active);
    }

    #[test]
    fn test_subagents_response_is_camel_case() {
        let body = SubagentsResponse {
            session_id: "s1".into(),
            subagents: vec![],
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"sessionId":"s1","subagents":[]}"#);
    }
}
