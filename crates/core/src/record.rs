// crates/core/src/record.rs
//! Typed view over a single line of a session record file.
//!
//! Lines are decoded into a `serde_json::Value` first and dispatched on the
//! `type` field, so unknown or missing record kinds survive as
//! [`Record::Other`] instead of failing the line. Any JSON object is a record:
//! a metadata field of the wrong type reads as absent, and a content block we
//! do not understand becomes [`ContentBlock::Other`].

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::RecordError;

/// One parsed line of a record file.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    User(MessageRecord),
    Assistant(MessageRecord),
    QueueOperation(QueueOperationRecord),
    /// Any other record kind (summaries, snapshots, progress, ...).
    Other(OtherRecord),
}

/// Fields shared by `user` and `assistant` records.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub cwd: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub git_branch: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub agent_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub is_sidechain: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub parent_uuid: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub uuid: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: MessageBody,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageBody {
    #[serde(default, deserialize_with = "lenient")]
    pub role: Option<String>,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, deserialize_with = "lenient")]
    pub model: Option<String>,
}

/// Message content is either a bare string or an ordered list of blocks.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueOperationRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub operation: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OtherRecord {
    /// The `type` field, if the line had a string one.
    pub kind: Option<String>,
    pub timestamp: Option<String>,
    pub session_id: Option<String>,
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Blocks(Vec::new())
    }
}

impl<'de> Deserialize<'de> for MessageContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => MessageContent::Text(text),
            Value::Array(items) => {
                MessageContent::Blocks(items.into_iter().map(ContentBlock::from_value).collect())
            }
            _ => MessageContent::default(),
        })
    }
}

impl MessageContent {
    /// The string content, or the first text block.
    pub fn first_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Blocks(blocks) => blocks.iter().find_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            MessageContent::Text(_) => &[],
            MessageContent::Blocks(blocks) => blocks,
        }
    }
}

impl ContentBlock {
    fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or(ContentBlock::Other)
    }

    pub fn tool_use_name(&self) -> Option<&str> {
        match self {
            ContentBlock::ToolUse { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_error_result(&self) -> bool {
        matches!(
            self,
            ContentBlock::ToolResult {
                is_error: Some(true),
                ..
            }
        )
    }
}

impl MessageRecord {
    pub fn blocks(&self) -> &[ContentBlock] {
        self.message.content.blocks()
    }

    pub fn tool_use_count(&self) -> usize {
        self.blocks()
            .iter()
            .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
            .count()
    }
}

impl Record {
    /// Build a record from an already-decoded JSON line.
    ///
    /// # Errors
    /// `RecordError::NotAnObject` if the line is valid JSON but not an object.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        if !value.is_object() {
            return Err(RecordError::NotAnObject);
        }
        let kind = string_field(&value, "type");

        let shape_err = |e: serde_json::Error| RecordError::InvalidShape {
            kind: kind.clone().unwrap_or_default(),
            message: e.to_string(),
        };

        match kind.as_deref().unwrap_or_default() {
            "user" => serde_json::from_value(value).map(Record::User).map_err(shape_err),
            "assistant" => serde_json::from_value(value)
                .map(Record::Assistant)
                .map_err(shape_err),
            "queue-operation" => serde_json::from_value(value)
                .map(Record::QueueOperation)
                .map_err(shape_err),
            _ => Ok(Record::Other(OtherRecord {
                timestamp: string_field(&value, "timestamp"),
                session_id: string_field(&value, "sessionId"),
                kind: kind.clone(),
            })),
        }
    }

    pub fn timestamp(&self) -> Option<&str> {
        match self {
            Record::User(m) | Record::Assistant(m) => m.timestamp.as_deref(),
            Record::QueueOperation(q) => q.timestamp.as_deref(),
            Record::Other(o) => o.timestamp.as_deref(),
        }
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp().and_then(parse_timestamp)
    }

    /// Non-empty `sessionId`, if the record carries one.
    pub fn session_id(&self) -> Option<&str> {
        let id = match self {
            Record::User(m) | Record::Assistant(m) => m.session_id.as_deref(),
            Record::QueueOperation(q) => q.session_id.as_deref(),
            Record::Other(o) => o.session_id.as_deref(),
        };
        id.filter(|s| !s.is_empty())
    }

    /// The message body for user/assistant records.
    pub fn as_message(&self) -> Option<&MessageRecord> {
        match self {
            Record::User(m) | Record::Assistant(m) => Some(m),
            _ => None,
        }
    }
}

/// Parse an ISO-8601 timestamp into UTC. Unparseable input yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Decode a field, treating a value of the wrong type as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_record_with_string_content() {
        let record = Record::from_value(json!({
            "type": "user",
            "sessionId": "s1",
            "timestamp": "2026-01-01T00:00:00Z",
            "cwd": "/work",
            "isSidechain": true,
            "message": {"role": "user", "content": "Task: do it"}
        }))
        .unwrap();

        let Record::User(m) = &record else {
            panic!("expected user record, got {record:?}");
        };
        assert_eq!(m.cwd.as_deref(), Some("/work"));
        assert_eq!(m.is_sidechain, Some(true));
        assert_eq!(m.message.content.first_text(), Some("Task: do it"));
        assert_eq!(record.session_id(), Some("s1"));
    }

    #[test]
    fn test_assistant_blocks_are_lenient() {
        let record = Record::from_value(json!({
            "type": "assistant",
            "message": {
                "model": "claude-opus",
                "content": [
                    {"type": "thinking", "thinking": "..."},
                    {"type": "text", "text": "hello"},
                    {"type": "tool_use", "id": "t1", "name": "Bash", "input": {"cmd": "ls"}},
                    {"no_type": true}
                ]
            }
        }))
        .unwrap();

        let m = record.as_message().unwrap();
        assert_eq!(m.blocks().len(), 4);
        assert_eq!(m.blocks()[0], ContentBlock::Other);
        assert_eq!(m.blocks()[3], ContentBlock::Other);
        assert_eq!(m.tool_use_count(), 1);
        assert_eq!(m.blocks()[2].tool_use_name(), Some("Bash"));
        assert_eq!(m.message.content.first_text(), Some("hello"));
    }

    #[test]
    fn test_tool_result_error_flag() {
        let block: ContentBlock = serde_json::from_value(json!({
            "type": "tool_result",
            "tool_use_id": "t1",
            "content": "boom",
            "is_error": true
        }))
        .unwrap();
        assert!(block.is_error_result());

        let ok: ContentBlock =
            serde_json::from_value(json!({"type": "tool_result", "tool_use_id": "t1"})).unwrap();
        assert!(!ok.is_error_result());
    }

    #[test]
    fn test_unknown_type_becomes_other() {
        let record = Record::from_value(json!({
            "type": "summary",
            "timestamp": "2026-01-01T00:00:00Z",
            "sessionId": ""
        }))
        .unwrap();
        assert!(matches!(&record, Record::Other(o) if o.kind.as_deref() == Some("summary")));
        assert_eq!(record.timestamp(), Some("2026-01-01T00:00:00Z"));
        // Empty ids are treated as absent.
        assert_eq!(record.session_id(), None);
    }

    #[test]
    fn test_untyped_object_is_kept_as_other() {
        let record = Record::from_value(json!({
            "sessionId": "s1",
            "timestamp": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(matches!(&record, Record::Other(o) if o.kind.is_none()));
        assert_eq!(record.timestamp(), Some("2026-01-01T00:00:00Z"));
        assert_eq!(record.session_id(), Some("s1"));

        assert!(matches!(
            Record::from_value(json!({"type": 5})),
            Ok(Record::Other(OtherRecord { kind: None, .. }))
        ));
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(matches!(
            Record::from_value(json!([1, 2, 3])),
            Err(RecordError::NotAnObject)
        ));
        assert!(matches!(Record::from_value(json!("x")), Err(RecordError::NotAnObject)));
    }

    #[test]
    fn test_mistyped_metadata_reads_as_absent() {
        let record = Record::from_value(json!({
            "type": "assistant",
            "timestamp": "2026-01-01T00:00:00Z",
            "parentUuid": 7,
            "isSidechain": "no",
            "cwd": ["/w"],
            "message": {
                "role": 1,
                "model": "claude-opus",
                "content": [{"type": "tool_use", "id": "t1", "name": "Bash", "input": {}}]
            }
        }))
        .unwrap();

        let m = record.as_message().unwrap();
        assert!(matches!(record, Record::Assistant(_)));
        assert_eq!(m.parent_uuid, None);
        assert_eq!(m.is_sidechain, None);
        assert_eq!(m.cwd, None);
        assert_eq!(m.message.role, None);
        assert_eq!(m.message.model.as_deref(), Some("claude-opus"));
        assert_eq!(m.tool_use_count(), 1);
        assert_eq!(record.timestamp(), Some("2026-01-01T00:00:00Z"));

        // A timestamp of the wrong type is dropped but the record survives.
        let record = Record::from_value(json!({"type": "user", "timestamp": 12})).unwrap();
        assert_eq!(record.timestamp(), None);

        // So is a message body that is not an object.
        let record = Record::from_value(json!({"type": "user", "message": "hi"})).unwrap();
        assert!(record.as_message().unwrap().blocks().is_empty());
    }

    #[test]
    fn test_parse_timestamp_normalizes_offsets() {
        let a = parse_timestamp("2026-01-01T01:00:00+01:00").unwrap();
        let b = parse_timestamp("2026-01-01T00:00:00.000Z").unwrap();
        assert_eq!(a, b);
        assert!(parse_timestamp("yesterday").is_none());
    }
}
