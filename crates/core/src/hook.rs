// crates/core/src/hook.rs
//! Lifecycle events pushed in by assistant hooks.
//!
//! Payloads arrive as untyped JSON. [`parse_hook_event`] checks the structure
//! field by field (so the caller gets a precise rejection reason) and then
//! decodes into the typed [`HookEvent`]. Every other field, including the
//! optional `gitBranch` and `slug`, is kept untouched in [`HookBase::extra`]
//! so re-serializing reproduces what the hook sent, explicit nulls included.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

pub use crate::error::HookValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookBase {
    pub session_id: String,
    pub timestamp: String,
    pub cwd: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HookEvent {
    #[serde(rename_all = "camelCase")]
    SessionStart {
        #[serde(flatten)]
        base: HookBase,
    },
    #[serde(rename_all = "camelCase")]
    SessionEnd {
        #[serde(flatten)]
        base: HookBase,
        message_count: Number,
        duration: Number,
    },
    #[serde(rename_all = "camelCase")]
    PreToolUse {
        #[serde(flatten)]
        base: HookBase,
        tool_name: String,
        tool_input: Map<String, Value>,
        message_uuid: String,
    },
    #[serde(rename_all = "camelCase")]
    PostToolUse {
        #[serde(flatten)]
        base: HookBase,
        tool_name: String,
        tool_output: Value,
        success: bool,
        duration: Number,
        message_uuid: String,
    },
}

impl HookEvent {
    /// The `type` tag, e.g. `"PreToolUse"`.
    pub fn kind(&self) -> &'static str {
        match self {
            HookEvent::SessionStart { .. } => "SessionStart",
            HookEvent::SessionEnd { .. } => "SessionEnd",
            HookEvent::PreToolUse { .. } => "PreToolUse",
            HookEvent::PostToolUse { .. } => "PostToolUse",
        }
    }

    pub fn base(&self) -> &HookBase {
        match self {
            HookEvent::SessionStart { base, .. }
            | HookEvent::SessionEnd { base, .. }
            | HookEvent::PreToolUse { base, .. }
            | HookEvent::PostToolUse { base, .. } => base,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.base().session_id
    }

    /// Tool name for tool events.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            HookEvent::PreToolUse { tool_name, .. } | HookEvent::PostToolUse { tool_name, .. } => {
                Some(tool_name)
            }
            HookEvent::SessionStart { .. } | HookEvent::SessionEnd { .. } => None,
        }
    }
}

const BASE_FIELDS: [&str; 4] = ["type", "sessionId", "timestamp", "cwd"];

/// Validate and decode one hook payload.
///
/// Nothing is partially accepted: either the whole event is valid or the
/// first violated rule is reported.
pub fn parse_hook_event(payload: Value) -> Result<HookEvent, HookValidationError> {
    let Value::Object(obj) = payload else {
        return Err(HookValidationError::NotAnObject);
    };

    for field in BASE_FIELDS {
        if !obj.get(field).is_some_and(Value::is_string) {
            return Err(HookValidationError::MissingBaseField(field));
        }
    }

    let event_type: &'static str = match obj.get("type").and_then(Value::as_str) {
        Some("SessionStart") => "SessionStart",
        Some("SessionEnd") => "SessionEnd",
        Some("PreToolUse") => "PreToolUse",
        Some("PostToolUse") => "PostToolUse",
        other => {
            return Err(HookValidationError::UnknownType(
                other.unwrap_or_default().to_string(),
            ))
        }
    };
    let check = FieldCheck { obj: &obj, event_type };

    match event_type {
        "SessionStart" => {}
        "SessionEnd" => {
            check.require("messageCount", Value::is_number, "a number")?;
            check.require("duration", Value::is_number, "a number")?;
        }
        "PreToolUse" => {
            check.require("toolName", Value::is_string, "a string")?;
            check.require("toolInput", Value::is_object, "an object")?;
            check.require("messageUuid", Value::is_string, "a string")?;
        }
        _ => {
            check.require("toolName", Value::is_string, "a string")?;
            check.require("toolOutput", |_| true, "present")?;
            check.require("success", Value::is_boolean, "a boolean")?;
            check.require("duration", Value::is_number, "a number")?;
            check.require("messageUuid", Value::is_string, "a string")?;
        }
    }

    serde_json::from_value(Value::Object(obj)).map_err(|_| HookValidationError::InvalidField {
        event_type,
        field: "payload",
        expected: "decodable",
    })
}

struct FieldCheck<'a> {
    obj: &'a Map<String, Value>,
    event_type: &'static str,
}

impl FieldCheck<'_> {
    fn require(
        &self,
        field: &'static str,
        valid: impl Fn(&Value) -> bool,
        expected: &'static str,
    ) -> Result<(), HookValidationError> {
        match self.obj.get(field) {
            Some(value) if valid(value) => Ok(()),
            _ => Err(self.invalid(field, expected)),
        }
    }

    fn invalid(&self, field: &'static str, expected: &'static str) -> HookValidationError {
        HookValidationError::InvalidField {
            event_type: self.event_type,
            field,
            expected,
        }
    }
}
