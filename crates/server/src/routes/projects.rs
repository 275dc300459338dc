// crates/server/src/routes/projects.rs
//! Single project endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use co11y_core::{find_project, Project};
use serde::Serialize;
use ts_rs::TS;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ProjectResponse {
    pub project: Project,
}

/// GET /api/projects/:id - One project by its encoded directory name.
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<ProjectResponse>> {
    let project = find_project(state.projects_dir(), &project_id, Utc::now())
        .await
        .ok_or(ApiError::ProjectNotFound(project_id))?;
    Ok(Json(ProjectResponse { project }))
}

/// Create the projects routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/projects/{id}", get(get_project))
}
