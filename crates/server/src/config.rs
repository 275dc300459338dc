// crates/server/src/config.rs
//! Server configuration from command-line flags with environment fallbacks.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use axum::http::{header::InvalidHeaderValue, HeaderValue};
use clap::Parser;
use co11y_core::{claude_projects_dir, DiscoveryError};
use tower_http::cors::{Any, CorsLayer};

use crate::live::hub::HubConfig;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 3001;

/// Live dashboard backend for local agent sessions.
#[derive(Debug, Clone, Parser)]
#[command(name = "co11y", version, about)]
pub struct ServerConfig {
    /// Port to listen on.
    #[arg(long, env = "CO11Y_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind.
    #[arg(long, env = "CO11Y_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Root holding one directory per project. Defaults to ~/.claude/projects.
    #[arg(long, env = "CO11Y_PROJECTS_DIR")]
    pub projects_dir: Option<PathBuf>,

    /// Quiet period before a changed file triggers re-aggregation.
    #[arg(long, env = "CO11Y_DEBOUNCE_MS", default_value_t = 500)]
    pub debounce_ms: u64,

    #[arg(long, env = "CO11Y_SNAPSHOT_INTERVAL_SECS", default_value_t = 10)]
    pub snapshot_interval_secs: u64,

    #[arg(long, env = "CO11Y_HEARTBEAT_INTERVAL_SECS", default_value_t = 30)]
    pub heartbeat_interval_secs: u64,

    /// Lifecycle events kept for replay to newly attached clients.
    #[arg(long, env = "CO11Y_EVENT_BUFFER", default_value_t = 100)]
    pub event_buffer: usize,

    /// Frames a client may fall behind before it is disconnected.
    #[arg(long, env = "CO11Y_CLIENT_QUEUE", default_value_t = 64)]
    pub client_queue: usize,

    /// Single CORS origin to allow. Any origin when unset.
    #[arg(long, env = "CO11Y_ALLOWED_ORIGIN")]
    pub allowed_origin: Option<String>,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            snapshot_interval: Duration::from_secs(self.snapshot_interval_secs.max(1)),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            event_capacity: self.event_buffer,
            client_queue: self.client_queue.max(1),
        }
    }

    /// Explicit `--projects-dir`, else `~/.claude/projects`.
    pub fn resolve_projects_dir(&self) -> Result<PathBuf, DiscoveryError> {
        match &self.projects_dir {
            Some(dir) => Ok(dir.clone()),
            None => claude_projects_dir(),
        }
    }

    /// # Errors
    /// The configured origin is not a valid header value.
    pub fn cors_layer(&self) -> Result<CorsLayer, InvalidHeaderValue> {
        let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        Ok(match &self.allowed_origin {
            Some(origin) => cors.allow_origin(HeaderValue::from_str(origin)?),
            None => cors.allow_origin(Any),
        })
    }
}
