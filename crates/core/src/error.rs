// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when reading a record file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Record file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied reading file: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single line could not become a [`crate::Record`].
///
/// Never escalates past the parser: the line is logged and skipped.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record of type {kind:?} has an invalid shape: {message}")]
    InvalidShape { kind: String, message: String },
}

/// Rejection reasons for an incoming lifecycle (hook) event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HookValidationError {
    #[error("hook event must be a JSON object")]
    NotAnObject,

    #[error("missing or non-string base field `{0}`")]
    MissingBaseField(&'static str),

    #[error("unknown hook event type `{0}`")]
    UnknownType(String),

    #[error("{event_type}: field `{field}` must be {expected}")]
    InvalidField {
        event_type: &'static str,
        field: &'static str,
        expected: &'static str,
    },
}

/// Errors that can occur during project discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Home directory not found")]
    HomeDirNotFound,
}

impl ParseError {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
