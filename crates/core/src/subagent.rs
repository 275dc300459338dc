// crates/core/src/subagent.rs
use chrono::{DateTime, SecondsFormat, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use ts_rs::TS;

use crate::record::{ContentBlock, Record};
use crate::session::is_recent;

/// Status of a subagent, derived from its own record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "lowercase")]
pub enum SubagentStatus {
    Running,
    Completed,
    Error,
}

/// A delegated sub-task spawned by a session.
///
/// Note: ts-rs exports i64 as TypeScript `number` (safe for millisecond durations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct Subagent {
    /// Short alphanumeric id from the `agent-{id}.jsonl` filename.
    pub agent_id: String,

    /// Owning session, read from the first record that carries one.
    /// Empty when the file could not be correlated.
    pub session_id: String,

    /// Task description from the first user record, `Task:` label stripped.
    pub task: String,

    pub status: SubagentStatus,

    /// Timestamp of the first record, or analysis time for an empty file.
    pub start_time: String,

    /// Timestamp of the last record. None while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,

    /// `end_time - start_time` in milliseconds. None while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,

    pub message_count: usize,
    pub tool_call_count: usize,

    /// Name of the most recent tool call. Only surfaced while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tool: Option<String>,
}

pub const UNKNOWN_TASK: &str = "Unknown task";

fn task_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Task:\s*(.+)").ok()).as_ref()
}

/// Derive a [`Subagent`] from its records.
pub fn analyze_subagent(
    agent_id: &str,
    session_id: &str,
    records: &[Record],
    now: DateTime<Utc>,
) -> Subagent {
    let status = subagent_status(records, now);

    let message_count = records.iter().filter(|r| r.as_message().is_some()).count();
    let tool_call_count = records
        .iter()
        .map(|r| match r {
            Record::Assistant(m) => m.tool_use_count(),
            _ => 0,
        })
        .sum();

    let start_time = records
        .first()
        .and_then(Record::timestamp)
        .map(str::to_string)
        .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Millis, true));

    let (end_time, duration) = match (status, records.last()) {
        (SubagentStatus::Running, _) | (_, None) => (None, None),
        (_, Some(last)) => {
            let end = last.timestamp().map(str::to_string);
            let duration = match (records.first().and_then(Record::parsed_timestamp), last.parsed_timestamp()) {
                (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
                _ => None,
            };
            (end, duration)
        }
    };

    let current_tool = match status {
        SubagentStatus::Running => current_tool(records),
        _ => None,
    };

    Subagent {
        agent_id: agent_id.to_string(),
        session_id: session_id.to_string(),
        task: extract_task(records),
        status,
        start_time,
        end_time,
        duration,
        message_count,
        tool_call_count,
        current_tool,
    }
}

/// Error beats running beats completed.
pub fn subagent_status(records: &[Record], now: DateTime<Utc>) -> SubagentStatus {
    let has_error = records
        .iter()
        .filter_map(Record::as_message)
        .any(|m| m.blocks().iter().any(ContentBlock::is_error_result));
    if has_error {
        return SubagentStatus::Error;
    }

    let last_is_recent = records
        .last()
        .and_then(Record::parsed_timestamp)
        .is_some_and(|last| is_recent(last, now));
    if last_is_recent {
        SubagentStatus::Running
    } else {
        SubagentStatus::Completed
    }
}

/// Task text from the first user record.
pub fn extract_task(records: &[Record]) -> String {
    let Some(text) = records
        .iter()
        .find_map(|r| match r {
            Record::User(m) => Some(m),
            _ => None,
        })
        .and_then(|m| m.message.content.first_text())
    else {
        return UNKNOWN_TASK.to_string();
    };

    match task_regex()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
    {
        Some(m) => m.as_str().trim().to_string(),
        None => text.to_string(),
    }
}

/// First tool call in the latest assistant record that made one.
fn current_tool(records: &[Record]) -> Option<String> {
    records.iter().rev().find_map(|r| match r {
        Record::Assistant(m) => m
            .blocks()
            .iter()
            .find_map(ContentBlock::tool_use_name)
            .map(str::to_string),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use serde_json::json;

    fn rec(value: serde_json::Value) -> Record {
        parse_line(&value.to_string()).unwrap()
    }

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn tool_call(ts: &str, name: &str) -> Record {
        rec(json!({"type": "assistant", "timestamp": ts, "message": {"content": [
            {"type": "text", "text": "working"},
            {"type": "tool_use", "id": name, "name": name, "input": {}}
        ]}}))
    }

    fn tool_error(ts: &str) -> Record {
        rec(json!({"type": "user", "timestamp": ts, "message": {"content": [
            {"type": "tool_result", "tool_use_id": "x", "content": "failed", "is_error": true}
        ]}}))
    }

    #[test]
    fn test_error_takes_precedence_over_recent_activity() {
        let records = vec![tool_error("2026-03-01T11:59:00Z"), tool_call("2026-03-01T11:59:30Z", "Bash")];
        let sub = analyze_subagent("abc123", "s1", &records, now());
        assert_eq!(sub.status, SubagentStatus::Error);
        assert!(sub.current_tool.is_none());
        assert_eq!(sub.end_time.as_deref(), Some("2026-03-01T11:59:30Z"));
        assert_eq!(sub.duration, Some(30_000));
    }

    #[test]
    fn test_running_surfaces_current_tool() {
        let records = vec![
            rec(json!({"type": "user", "timestamp": "2026-03-01T11:57:00Z", "message": {"content": "Task: Find the bug\n"}})),
            tool_call("2026-03-01T11:58:00Z", "Grep"),
            tool_call("2026-03-01T11:59:00Z", "Read"),
            rec(json!({"type": "user", "timestamp": "2026-03-01T11:59:10Z", "message": {"content": [
                {"type": "tool_result", "tool_use_id": "Read", "content": "ok"}
            ]}})),
        ];
        let sub = analyze_subagent("abc123", "s1", &records, now());
        assert_eq!(sub.status, SubagentStatus::Running);
        assert_eq!(sub.current_tool.as_deref(), Some("Read"));
        assert_eq!(sub.task, "Find the bug");
        assert_eq!(sub.message_count, 4);
        assert_eq!(sub.tool_call_count, 2);
        assert!(sub.end_time.is_none());
        assert!(sub.duration.is_none());
    }

    #[test]
    fn test_stale_subagent_is_completed() {
        let records = vec![tool_call("2026-03-01T10:00:00Z", "Bash")];
        let sub = analyze_subagent("a1", "s1", &records, now());
        assert_eq!(sub.status, SubagentStatus::Completed);
        assert_eq!(sub.start_time, "2026-03-01T10:00:00Z");
        assert_eq!(sub.duration, Some(0));
    }

    #[test]
    fn test_empty_subagent() {
        let sub = analyze_subagent("a1", "", &[], now());
        assert_eq!(sub.status, SubagentStatus::Completed);
        assert_eq!(sub.task, UNKNOWN_TASK);
        assert_eq!(sub.start_time, "2026-03-01T12:00:00.000Z");
        assert!(sub.end_time.is_none());
    }

    #[test]
    fn test_task_extraction_variants() {
        let blocks = vec![rec(json!({"type": "user", "message": {"content": [
            {"type": "image"},
            {"type": "text", "text": "task:   Refactor parser  "}
        ]}}))];
        assert_eq!(extract_task(&blocks), "Refactor parser");

        let plain = vec![rec(json!({"type": "user", "message": {"content": "Just do it"}}))];
        assert_eq!(extract_task(&plain), "Just do it");

        let no_text = vec![rec(json!({"type": "user", "message": {"content": [
            {"type": "tool_result", "tool_use_id": "1"}
        ]}}))];
        assert_eq!(extract_task(&no_text), UNKNOWN_TASK);
    }

    #[test]
    fn test_serializes_camel_case_without_empty_options() {
        let sub = analyze_subagent("a1", "s1", &[tool_call("2026-03-01T11:59:00Z", "Bash")], now());
        let value = serde_json::to_value(&sub).unwrap();
        assert_eq!(value["agentId"], "a1");
        assert_eq!(value["status"], "running");
        assert_eq!(value["currentTool"], "Bash");
        assert!(value.get("endTime").is_none());
    }
}
