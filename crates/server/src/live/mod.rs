//! Live push pipeline: file watcher, broadcast hub, and the frames they emit.

pub mod frame;
pub mod hub;
pub mod ring;
pub mod watcher;

pub use frame::{Frame, FrameKind};
pub use hub::{BroadcastHub, ClientHandle, ClientId, HubConfig};
