//! Named push frames delivered to dashboard clients.
//!
//! Wire format, one frame per event:
//!
//! ```text
//! event: <kind>\ndata: <json>\n\n
//! ```
//!
//! The JSON payload is serialized once when the frame is built and shared by
//! every client it is fanned out to.

use std::sync::Arc;

use axum::response::sse::Event;
use chrono::{DateTime, SecondsFormat, Utc};
use co11y_core::{HookEvent, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// `{timestamp}` keepalive.
    Heartbeat,
    /// One lifecycle event, as received.
    Hook,
    /// The full current session list.
    Sessions,
}

impl FrameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Heartbeat => "heartbeat",
            FrameKind::Hook => "hook",
            FrameKind::Sessions => "sessions",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    kind: FrameKind,
    data: Arc<str>,
}

impl Frame {
    pub fn heartbeat(now: DateTime<Utc>) -> Self {
        let payload = serde_json::json!({
            "timestamp": now.to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        Self::new(FrameKind::Heartbeat, payload.to_string())
    }

    pub fn hook(event: &HookEvent) -> Self {
        Self::new(
            FrameKind::Hook,
            serde_json::to_string(event).unwrap_or_default(),
        )
    }

    pub fn sessions(sessions: &[Session]) -> Self {
        Self::new(
            FrameKind::Sessions,
            serde_json::to_string(sessions).unwrap_or_default(),
        )
    }

    fn new(kind: FrameKind, data: String) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// Raw text-event-stream encoding.
    pub fn encode(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind.as_str(), self.data)
    }

    pub fn to_sse_event(&self) -> Event {
        Event::default().event(self.kind.as_str()).data(&*self.data)
    }
}
