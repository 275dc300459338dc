// crates/server/src/routes/events.rs
//! Push transport: the long-lived dashboard event stream.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::sse::{Event, Sse},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio_stream::{Stream, StreamExt};

use crate::state::AppState;

/// GET /api/events - SSE stream of hub frames.
///
/// # Events
///
/// | Event name  | When emitted                                          |
/// |-------------|-------------------------------------------------------|
/// | `heartbeat` | On connect, then every heartbeat interval             |
/// | `hook`      | Buffered lifecycle events on connect, then each new one |
/// | `sessions`  | After every aggregation pass                          |
///
/// The client is registered with the hub before the response is returned and
/// detached when the body stream is dropped, whichever side ends it.
pub async fn event_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let client = state.hub.attach();
    tracing::debug!(client_id = client.id(), "Event stream opened");

    (
        [(header::CONNECTION, "keep-alive")],
        Sse::new(frames_to_events(client.into_frames())),
    )
}

fn frames_to_events(
    frames: impl Stream<Item = crate::live::Frame> + Send + 'static,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    frames.map(|frame| Ok(frame.to_sse_event()))
}

/// Create the event stream router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/events", get(event_stream))
}
