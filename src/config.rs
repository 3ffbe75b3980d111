//! Tunables for transport sessions and their screen buffers.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Session settings. Every field has a default, so a partial JSON document
/// is enough to override a single value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Upper bound for TCP connect + SSH handshake, in milliseconds.
    pub connect_timeout_ms: u64,
    /// TERM value requested with the PTY.
    pub term: String,
    /// Lines kept above the viewport before the oldest are dropped.
    pub scrollback_limit: usize,
    /// Placeholder pixel size of one character cell, reported with PTY
    /// and window-change requests.
    pub cell_pixel_width: u32,
    pub cell_pixel_height: u32,
    /// SSH keepalive interval in seconds, 0 disables keepalives.
    pub keepalive_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            term: "xterm-256color".to_string(),
            scrollback_limit: 10_000,
            cell_pixel_width: 8,
            cell_pixel_height: 16,
            keepalive_secs: 30,
        }
    }
}

impl SessionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        if self.keepalive_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.keepalive_secs))
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, anyhow::Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings =
            Self::from_json_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        log::debug!("Loaded session settings from {}", path.display());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SessionSettings::default();
        assert_eq!(settings.connect_timeout(), Duration::from_secs(10));
        assert_eq!(settings.term, "xterm-256color");
        assert_eq!(settings.keepalive_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings =
            SessionSettings::from_json_str(r#"{"connect_timeout_ms": 2500, "keepalive_secs": 0}"#)
                .unwrap();
        assert_eq!(settings.connect_timeout(), Duration::from_millis(2500));
        assert_eq!(settings.keepalive_interval(), None);
        assert_eq!(settings.scrollback_limit, 10_000);
        assert_eq!(settings.cell_pixel_width, 8);
    }

    #[test]
    fn test_load_missing_file() {
        let err = SessionSettings::load(Path::new("/nonexistent_dir_xyz/settings.json")).unwrap_err();
        assert!(err.to_string().contains("reading /nonexistent_dir_xyz/settings.json"));
    }

    #[test]
    fn test_load_reports_bad_json_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{\"connect_timeout_ms\": \"soon\"}").unwrap();
        let err = SessionSettings::load(&path).unwrap_err();
        assert!(err.to_string().starts_with("parsing "));

        std::fs::write(&path, r#"{"scrollback_limit": 500}"#).unwrap();
        assert_eq!(SessionSettings::load(&path).unwrap().scrollback_limit, 500);
    }
}
