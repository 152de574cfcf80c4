//! Common utility functions shared across CLI commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use floralog_core::LocalState;

/// Resolve the local state directory.
///
/// `FLORALOG_STATE_DIR` overrides the platform default of
/// `<data_dir>/floralog`.
pub fn state_dir() -> PathBuf {
    match std::env::var_os("FLORALOG_STATE_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("floralog"),
    }
}

/// Open the persistent local state (submitter ID, rolling cache).
pub fn open_state() -> Result<LocalState> {
    let dir = state_dir();
    LocalState::open(&dir)
        .with_context(|| format!("Failed to open state directory: {}", dir.display()))
}

/// Format a Unix timestamp (seconds) as a human-readable UTC string.
pub fn format_timestamp(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M UTC").to_string(),
        _ => format!("{}s", timestamp),
    }
}

/// Format a byte count with a binary unit suffix.
pub fn format_bytes(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
