//! Utility helpers — path resolution, date formatting, string manipulation.
//!
//! Replaces nanobot's `utils/helpers.py`.

use std::path::PathBuf;

/// Get the Picoclaw data directory (e.g. `~/.picoclaw/`).
pub fn get_data_path() -> PathBuf {
    let home = dirs_next().unwrap_or_else(|| PathBuf::from("."));
    home.join(".picoclaw")
}

/// Get the sessions directory (e.g. `~/.picoclaw/sessions/`).
pub fn get_sessions_path() -> PathBuf {
    get_data_path().join("sessions")
}

/// Get the default workspace path (e.g. `~/.picoclaw/workspace/`).
pub fn get_default_workspace_path() -> PathBuf {
    get_data_path().join("workspace")
}

/// Get today's date as YYYY-MM-DD.
pub fn today_date() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Get current ISO 8601 timestamp.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Sanitize a string for use as a filename.
pub fn safe_filename(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path == "~" {
        let home = dirs_next().unwrap_or_else(|| PathBuf::from("."));
        home.join(&path[2..])
    } else {
        PathBuf::from(path)
    }
}

/// Helper to get home directory.
fn dirs_next() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}


