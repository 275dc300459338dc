// crates/core/src/session.rs
//! Reduces a session's records into aggregate metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::record::Record;

/// A session (or subagent) whose latest record is younger than this is live.
pub const ACTIVE_THRESHOLD_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Idle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionAnalysis {
    pub message_count: usize,
    pub tool_call_count: usize,
    /// Raw timestamp string of the latest record, as written in the file.
    pub last_activity_time: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub model: Option<String>,
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub slug: Option<String>,
}

/// True iff `last` is strictly less than five minutes before `now`.
pub fn is_recent(last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now - last).num_milliseconds() < ACTIVE_THRESHOLD_MS
}

/// Single pass over `records`.
///
/// Last activity is the maximum parsed timestamp over every record, queue
/// operations included. Message and tool counts plus first-seen metadata
/// only look at user and assistant records.
pub fn analyze_session(records: &[Record], now: DateTime<Utc>) -> SessionAnalysis {
    let mut analysis = SessionAnalysis {
        message_count: 0,
        tool_call_count: 0,
        last_activity_time: None,
        last_activity: None,
        status: SessionStatus::Idle,
        model: None,
        cwd: None,
        git_branch: None,
        slug: None,
    };

    for record in records {
        if let (Some(raw), Some(ts)) = (record.timestamp(), record.parsed_timestamp()) {
            if analysis.last_activity.map_or(true, |cur| ts > cur) {
                analysis.last_activity = Some(ts);
                analysis.last_activity_time = Some(raw.to_string());
            }
        }

        let Some(message) = record.as_message() else {
            continue;
        };
        analysis.message_count += 1;

        fill_once(&mut analysis.cwd, &message.cwd);
        fill_once(&mut analysis.git_branch, &message.git_branch);
        fill_once(&mut analysis.slug, &message.slug);

        if let Record::Assistant(assistant) = record {
            analysis.tool_call_count += assistant.tool_use_count();
            fill_once(&mut analysis.model, &assistant.message.model);
        }
    }

    if analysis.last_activity.is_some_and(|last| is_recent(last, now)) {
        analysis.status = SessionStatus::Active;
    }
    analysis
}

fn fill_once(slot: &mut Option<String>, candidate: &Option<String>) {
    if slot.is_none() {
        if let Some(value) = candidate.as_deref().filter(|v| !v.is_empty()) {
            *slot = Some(value.to_string());
        }
    }
}
