// crates/core/src/discovery.rs
//! Project and session discovery over a projects root.
//!
//! Layout on disk:
//!
//! ```text
//! <projects root>/
//!   -Users-foo-my-app/                       one project per encoded path
//!     3f2a...-....-....-....-............jsonl   main session (UUID name)
//!     agent-a1b2c3.jsonl                     subagent transcript
//! ```
//!
//! Every function here re-reads the directory listing on each call. A missing
//! or unreadable directory yields an empty list plus a warning, never an error.

use crate::error::DiscoveryError;
use crate::parser::parse_records;
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;
use tracing::warn;

/// Extension shared by session and subagent record files.
pub const RECORD_EXTENSION: &str = "jsonl";

/// Returns the path to the Claude projects directory (~/.claude/projects).
///
/// # Errors
/// Returns `DiscoveryError::HomeDirNotFound` if the home directory cannot be determined.
pub fn claude_projects_dir() -> Result<PathBuf, DiscoveryError> {
    let home = dirs::home_dir().ok_or(DiscoveryError::HomeDirNotFound)?;
    Ok(home.join(".claude").join("projects"))
}

/// One project directory under the projects root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDir {
    /// Directory name as found on disk (e.g. "-Users-foo-my-app").
    pub encoded_name: String,
    /// Decoded filesystem path (e.g. "/Users/foo/my/app"). Lossy for dashes.
    pub decoded_path: String,
    /// Last decoded segment, for display.
    pub display_name: String,
    /// Absolute path of the directory itself.
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubagentFile {
    pub agent_id: String,
    /// Empty when no record in the file carries a session id.
    pub session_id: String,
    pub path: PathBuf,
}

fn session_file_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\.jsonl$").ok()
    })
    .as_ref()
}

fn subagent_file_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^agent-([a-zA-Z0-9]+)\.jsonl$").ok())
        .as_ref()
}

/// Decode an encoded project directory name.
///
/// Every dash is treated as a path separator and empty segments are dropped,
/// so `-Users-john-code-myapp` becomes `/Users/john/code/myapp`. Real dashes
/// in a path are indistinguishable from separators; this is kept as-is for
/// compatibility with existing directories.
pub fn decode_project_dir_name(encoded: &str) -> String {
    let joined = encoded
        .split('-')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{joined}")
}

/// Session id if `file_name` is a main session file.
pub fn session_id_from_file_name(file_name: &str) -> Option<&str> {
    session_file_regex()?
        .captures(file_name)?
        .get(1)
        .map(|m| m.as_str())
}

/// Agent id if `file_name` is a subagent file.
pub fn agent_id_from_file_name(file_name: &str) -> Option<&str> {
    subagent_file_regex()?
        .captures(file_name)?
        .get(1)
        .map(|m| m.as_str())
}

/// List immediate subdirectories of `projects_dir`, sorted by encoded name.
pub async fn scan_projects(projects_dir: &Path) -> Vec<ProjectDir> {
    let mut projects = Vec::new();
    let mut entries = match fs::read_dir(projects_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %projects_dir.display(), error = %e, "Unable to scan projects directory");
            return projects;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(path = %projects_dir.display(), error = %e, "Error while listing projects directory");
                break;
            }
        };

        // Follows symlinks, like a plain stat.
        let dir = entry.path();
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => continue,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Skipping unreadable project entry");
                continue;
            }
        }

        let encoded_name = entry.file_name().to_string_lossy().into_owned();
        let decoded_path = decode_project_dir_name(&encoded_name);
        let display_name = decoded_path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(encoded_name.as_str())
            .to_string();

        projects.push(ProjectDir {
            encoded_name,
            decoded_path,
            display_name,
            dir,
        });
    }

    projects.sort_by(|a, b| a.encoded_name.cmp(&b.encoded_name));
    projects
}

/// UUID-named record files in `project_dir`, sorted by id.
pub async fn discover_sessions(project_dir: &Path) -> Vec<SessionFile> {
    let mut sessions: Vec<SessionFile> = list_file_names(project_dir)
        .await
        .into_iter()
        .filter_map(|name| {
            let id = session_id_from_file_name(&name)?.to_string();
            Some(SessionFile {
                path: project_dir.join(&name),
                id,
            })
        })
        .collect();

    sessions.sort_by(|a, b| a.id.cmp(&b.id));
    sessions
}

/// `agent-<id>` record files in `project_dir`, sorted by agent id.
///
/// Each file is parsed to find its owning session. A file that cannot be
/// correlated is still listed, with an empty session id.
pub async fn discover_subagents(project_dir: &Path) -> Vec<SubagentFile> {
    let mut subagents = Vec::new();

    for name in list_file_names(project_dir).await {
        let Some(agent_id) = agent_id_from_file_name(&name) else {
            continue;
        };
        let path = project_dir.join(&name);

        let session_id = match parse_records(&path).await {
            Ok(records) => match records.iter().find_map(|r| r.session_id()) {
                Some(id) => id.to_string(),
                None => {
                    warn!(file = %name, "No sessionId found in subagent file, listing with empty sessionId");
                    String::new()
                }
            },
            Err(e) => {
                warn!(file = %name, error = %e, "Failed to parse subagent file");
                String::new()
            }
        };

        subagents.push(SubagentFile {
            agent_id: agent_id.to_string(),
            session_id,
            path,
        });
    }

    subagents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
    subagents
}

async fn list_file_names(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Unable to list project directory");
            return names;
        }
    };

    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Error while listing project directory");
                break;
            }
        }
    }
    names
}
