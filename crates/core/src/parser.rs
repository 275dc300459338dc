// crates/core/src/parser.rs
//! Newline-delimited record file parser.
//!
//! Every line is decoded on its own. Blank lines are skipped silently and a
//! line that fails to decode is logged and skipped, so one corrupt line can
//! never take the rest of the file down with it.

use crate::error::{ParseError, RecordError};
use crate::record::Record;
use serde_json::Value;
use std::path::Path;
use tracing::warn;

/// Read and parse a whole record file.
///
/// # Errors
/// - `ParseError::NotFound` if the file doesn't exist
/// - `ParseError::PermissionDenied` if the file can't be read
/// - `ParseError::Io` for other I/O errors
///
/// Malformed lines are never an error.
pub async fn parse_records(path: &Path) -> Result<Vec<Record>, ParseError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ParseError::io(path, e))?;
    Ok(parse_records_from_bytes(&bytes, path))
}

/// Parse already-loaded file bytes. `source` is only used for log context.
pub fn parse_records_from_bytes(bytes: &[u8], source: &Path) -> Vec<Record> {
    decode_lines(bytes, source, parse_line)
}

/// Read a record file as raw JSON objects, in file order.
///
/// Lines are kept or skipped exactly as [`parse_records`] would; the objects
/// are returned untouched rather than typed.
///
/// # Errors
/// Same as [`parse_records`].
pub async fn read_transcript(path: &Path) -> Result<Vec<Value>, ParseError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ParseError::io(path, e))?;
    Ok(decode_lines(&bytes, path, transcript_line))
}

/// Decode one non-blank line.
pub fn parse_line(line: &str) -> Result<Record, RecordError> {
    let value: Value = serde_json::from_str(line)?;
    Record::from_value(value)
}

fn transcript_line(line: &str) -> Result<Value, RecordError> {
    let value: Value = serde_json::from_str(line)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(RecordError::NotAnObject)
    }
}

fn decode_lines<T>(
    bytes: &[u8],
    source: &Path,
    decode: impl Fn(&str) -> Result<T, RecordError>,
) -> Vec<T> {
    let text = String::from_utf8_lossy(bytes);
    let mut out = Vec::new();

    for (idx, raw) in text.split('\n').enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match decode(line) {
            Ok(item) => out.push(item),
            Err(e) => {
                warn!(
                    path = %source.display(),
                    line = idx + 1,
                    error = %e,
                    "Skipping malformed record line"
                );
            }
        }
    }

    out
}
