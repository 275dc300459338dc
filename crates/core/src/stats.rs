// crates/core/src/stats.rs
//! Usage statistics read from the agent's own `stats-cache.json`.
//!
//! The cache is written by the agent, not by us. A missing or unreadable
//! cache is not an error: callers get zeroed stats and a warning in the log.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;
use ts_rs::TS;

/// File name of the cache, a sibling of the projects root.
pub const STATS_CACHE_FILE: &str = "stats-cache.json";

/// `~/.claude/stats-cache.json` for a projects root of `~/.claude/projects`.
pub fn stats_cache_path(projects_dir: &Path) -> PathBuf {
    projects_dir
        .parent()
        .unwrap_or(projects_dir)
        .join(STATS_CACHE_FILE)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "camelCase", default)]
pub struct DailyActivity {
    /// `YYYY-MM-DD`, UTC.
    pub date: String,
    #[ts(type = "number")]
    pub message_count: u64,
    #[ts(type = "number")]
    pub session_count: u64,
    #[ts(type = "number")]
    pub tool_call_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyModelTokens {
    pub date: String,
    pub tokens_by_model: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "camelCase", default)]
pub struct ModelUsage {
    #[ts(type = "number")]
    pub input_tokens: u64,
    #[ts(type = "number")]
    pub output_tokens: u64,
    #[ts(type = "number")]
    pub cache_read_input_tokens: u64,
    #[ts(type = "number")]
    pub cache_creation_input_tokens: u64,
    #[ts(type = "number")]
    pub web_search_requests: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
    #[ts(type = "number")]
    pub context_window: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "camelCase", default)]
pub struct LongestSession {
    pub session_id: String,
    /// Milliseconds.
    #[ts(type = "number")]
    pub duration: u64,
    #[ts(type = "number")]
    pub message_count: u64,
    pub timestamp: String,
}

/// On-disk cache layout. Fields we never report (hour counts, version) are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsCache {
    pub daily_activity: Vec<DailyActivity>,
    pub daily_model_tokens: Vec<DailyModelTokens>,
    pub model_usage: BTreeMap<String, ModelUsage>,
    pub total_sessions: u64,
    pub total_messages: u64,
    pub longest_session: LongestSession,
    pub first_session_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[ts(type = "number")]
    pub total_sessions: u64,
    #[ts(type = "number")]
    pub total_messages: u64,
    #[ts(type = "number")]
    pub messages_today: u64,
    #[ts(type = "number")]
    pub sessions_today: u64,
    #[ts(type = "number")]
    pub tool_calls_today: u64,
    /// Sum over every day and model in the cache.
    #[ts(type = "number")]
    pub total_tokens: u64,
    pub model_usage: BTreeMap<String, ModelUsage>,
    pub daily_activity: Vec<DailyActivity>,
    /// Empty when the cache is missing.
    pub first_session_date: String,
    pub longest_session: LongestSession,
}

/// `GET /api/stats` body.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
pub struct StatsResponse {
    pub stats: Stats,
}

impl Stats {
    /// Fold a cache into reported stats. "Today" is the `today` entry of the
    /// daily activity list, zero when there is none.
    pub fn from_cache(cache: StatsCache, today: NaiveDate) -> Self {
        let today = today.format("%Y-%m-%d").to_string();
        let todays = cache
            .daily_activity
            .iter()
            .find(|a| a.date == today)
            .cloned()
            .unwrap_or_default();

        let total_tokens = cache
            .daily_model_tokens
            .iter()
            .flat_map(|day| day.tokens_by_model.values())
            .fold(0u64, |sum, tokens| sum.saturating_add(*tokens));

        Self {
            total_sessions: cache.total_sessions,
            total_messages: cache.total_messages,
            messages_today: todays.message_count,
            sessions_today: todays.session_count,
            tool_calls_today: todays.tool_call_count,
            total_tokens,
            model_usage: cache.model_usage,
            daily_activity: cache.daily_activity,
            first_session_date: cache.first_session_date,
            longest_session: cache.longest_session,
        }
    }
}

/// Read and fold the cache at `path`. Zeroed stats if it is missing or bad.
pub async fn load_stats(path: &Path, today: NaiveDate) -> Stats {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read stats cache");
            return Stats::default();
        }
    };
    match serde_json::from_slice::<StatsCache>(&bytes) {
        Ok(cache) => Stats::from_cache(cache, today),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed stats cache");
            Stats::default()
        }
    }
}
