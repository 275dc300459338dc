// crates/core/src/snapshot.rs
//! Full project/session snapshot built from discovery plus analysis.
//!
//! A snapshot is always rebuilt from scratch: clients replace their whole view
//! with it, so there is no diffing and no state kept between builds.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};
use ts_rs::TS;

use crate::discovery::{
    discover_sessions, discover_subagents, scan_projects, ProjectDir, SessionFile, SubagentFile,
};
use crate::error::ParseError;
use crate::parser::{parse_records, read_transcript};
use crate::record::parse_timestamp;
use crate::session::{analyze_session, SessionStatus};
use crate::subagent::{analyze_subagent, Subagent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    /// Decoded project path.
    pub project: String,
    pub project_path: String,
    pub status: SessionStatus,
    pub last_activity: String,
    pub message_count: usize,
    pub tool_call_count: usize,
    pub subagent_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Encoded directory name.
    pub id: String,
    pub name: String,
    pub full_path: String,
    pub sessions: Vec<Session>,
    pub session_count: usize,
    pub active_session_count: usize,
    pub last_activity: String,
    pub total_messages: usize,
    pub total_tool_calls: usize,
    pub total_subagents: usize,
}

/// `GET /api/sessions/:id` body: the analyzed session plus every kept line of
/// its record file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub transcript: Vec<Value>,
}

/// Every non-empty project under the projects root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub projects: Vec<Project>,
}

/// `GET /api/sessions` body.
#[derive(Debug, Clone, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct ProjectsResponse {
    pub projects: Vec<Project>,
    pub total_projects: usize,
    pub total_sessions: usize,
    pub active_session_count: usize,
}

impl Snapshot {
    /// Sessions of every project, in project order.
    pub fn sessions(&self) -> Vec<Session> {
        self.projects
            .iter()
            .flat_map(|p| p.sessions.iter().cloned())
            .collect()
    }

    pub fn total_sessions(&self) -> usize {
        self.projects.iter().map(|p| p.session_count).sum()
    }

    pub fn active_session_count(&self) -> usize {
        self.projects.iter().map(|p| p.active_session_count).sum()
    }

    /// Keep only active sessions and drop projects left without any.
    pub fn filter_active(mut self) -> Self {
        self.projects.retain_mut(|project| {
            project
                .sessions
                .retain(|s| s.status == SessionStatus::Active);
            project.session_count = project.sessions.len();
            !project.sessions.is_empty()
        });
        self
    }

    pub fn into_response(self) -> ProjectsResponse {
        ProjectsResponse {
            total_projects: self.projects.len(),
            total_sessions: self.total_sessions(),
            active_session_count: self.active_session_count(),
            projects: self.projects,
        }
    }
}

/// Walk the whole projects root and analyze every session.
///
/// A session that fails to read is logged and left out; it never blanks the
/// rest of the snapshot.
pub async fn build_snapshot(projects_dir: &Path, now: DateTime<Utc>) -> Snapshot {
    let mut projects = Vec::new();
    for dir in scan_projects(projects_dir).await {
        let project = build_project(&dir, now).await;
        if project.session_count > 0 {
            projects.push(project);
        }
    }

    projects.sort_by(|a, b| {
        b.session_count
            .cmp(&a.session_count)
            .then_with(|| a.id.cmp(&b.id))
    });

    debug!(
        projects = projects.len(),
        sessions = projects.iter().map(|p| p.session_count).sum::<usize>(),
        "Built snapshot"
    );
    Snapshot { projects }
}

/// Build one project by its encoded directory name. `None` if no such directory.
pub async fn find_project(
    projects_dir: &Path,
    project_id: &str,
    now: DateTime<Utc>,
) -> Option<Project> {
    let dir = scan_projects(projects_dir)
        .await
        .into_iter()
        .find(|p| p.encoded_name == project_id)?;
    Some(build_project(&dir, now).await)
}

/// Locate a session file by id across all projects.
pub async fn locate_session(
    projects_dir: &Path,
    session_id: &str,
) -> Option<(ProjectDir, SessionFile)> {
    for dir in scan_projects(projects_dir).await {
        if let Some(file) = discover_sessions(&dir.dir)
            .await
            .into_iter()
            .find(|s| s.id == session_id)
        {
            return Some((dir, file));
        }
    }
    None
}

/// Analyze a single session by id.
///
/// # Errors
/// `ParseError::NotFound` if no project holds this session, or whatever
/// reading the session file produced.
pub async fn find_session(
    projects_dir: &Path,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<Session, ParseError> {
    let (dir, file) = locate_session(projects_dir, session_id)
        .await
        .ok_or_else(|| ParseError::not_found(projects_dir.join(format!("{session_id}.jsonl"))))?;
    let subagents = discover_subagents(&dir.dir).await;
    analyze_session_file(&dir, &file, &subagents, now).await
}

/// Analyze a single session by id and attach its transcript.
///
/// # Errors
/// Same as [`find_session`].
pub async fn session_detail(
    projects_dir: &Path,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<SessionDetail, ParseError> {
    let (dir, file) = locate_session(projects_dir, session_id)
        .await
        .ok_or_else(|| ParseError::not_found(projects_dir.join(format!("{session_id}.jsonl"))))?;
    let subagents = discover_subagents(&dir.dir).await;
    let session = analyze_session_file(&dir, &file, &subagents, now).await?;
    let transcript = read_transcript(&file.path).await?;
    Ok(SessionDetail {
        session,
        transcript,
    })
}

/// Analyze every subagent owned by `session_id`.
///
/// Returns `None` when the session itself does not exist. A subagent whose
/// file cannot be read is skipped.
pub async fn session_subagents(
    projects_dir: &Path,
    session_id: &str,
    now: DateTime<Utc>,
) -> Option<Vec<Subagent>> {
    let (dir, _) = locate_session(projects_dir, session_id).await?;

    let mut subagents = Vec::new();
    for file in discover_subagents(&dir.dir)
        .await
        .into_iter()
        .filter(|s| s.session_id == session_id)
    {
        match parse_records(&file.path).await {
            Ok(records) => subagents.push(analyze_subagent(&file.agent_id, session_id, &records, now)),
            Err(e) => warn!(agent_id = %file.agent_id, error = %e, "Failed to analyze subagent"),
        }
    }
    Some(subagents)
}

async fn build_project(dir: &ProjectDir, now: DateTime<Utc>) -> Project {
    let session_files = discover_sessions(&dir.dir).await;
    let subagents = discover_subagents(&dir.dir).await;

    let mut project = Project {
        id: dir.encoded_name.clone(),
        name: dir.display_name.clone(),
        full_path: dir.decoded_path.clone(),
        sessions: Vec::with_capacity(session_files.len()),
        session_count: 0,
        active_session_count: 0,
        last_activity: String::new(),
        total_messages: 0,
        total_tool_calls: 0,
        total_subagents: 0,
    };
    let mut latest: Option<DateTime<Utc>> = None;

    for file in &session_files {
        let session = match analyze_session_file(dir, file, &subagents, now).await {
            Ok(session) => session,
            Err(e) => {
                warn!(session_id = %file.id, error = %e, "Failed to process session");
                continue;
            }
        };

        project.session_count += 1;
        if session.status == SessionStatus::Active {
            project.active_session_count += 1;
        }
        project.total_messages += session.message_count;
        project.total_tool_calls += session.tool_call_count;
        project.total_subagents += session.subagent_count;

        let ts = parse_timestamp(&session.last_activity);
        if project.last_activity.is_empty() || ts > latest {
            latest = ts;
            project.last_activity = session.last_activity.clone();
        }
        project.sessions.push(session);
    }

    project
        .sessions
        .sort_by_key(|s| std::cmp::Reverse(parse_timestamp(&s.last_activity)));
    project
}

async fn analyze_session_file(
    dir: &ProjectDir,
    file: &SessionFile,
    subagents: &[SubagentFile],
    now: DateTime<Utc>,
) -> Result<Session, ParseError> {
    let records = parse_records(&file.path).await?;
    let analysis = analyze_session(&records, now);

    let last_activity = match analysis.last_activity_time {
        Some(ts) => ts,
        None => mtime_or_epoch(&file.path).await,
    };

    Ok(Session {
        id: file.id.clone(),
        project: dir.decoded_path.clone(),
        project_path: dir.decoded_path.clone(),
        status: analysis.status,
        last_activity,
        message_count: analysis.message_count,
        tool_call_count: analysis.tool_call_count,
        subagent_count: subagents.iter().filter(|s| s.session_id == file.id).count(),
        model: analysis.model,
        cwd: analysis.cwd,
        git_branch: analysis.git_branch,
        slug: analysis.slug,
    })
}

async fn mtime_or_epoch(path: &Path) -> String {
    let modified = tokio::fs::metadata(path)
        .await
        .and_then(|meta| meta.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::UNIX_EPOCH);
    modified.to_rfc3339_opts(SecondsFormat::Millis, true)
}
