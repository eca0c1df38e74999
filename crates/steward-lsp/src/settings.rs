//! User settings and internal timing knobs.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Key under which clients may nest the settings object.
pub const SETTINGS_SECTION: &str = "steward";

/// Settings supplied by the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Solution or project entry point; its directory is the workspace root.
    pub solution_path: Option<PathBuf>,
    /// Extensions of files loaded into the snapshot.
    pub source_extensions: Vec<String>,
    /// Extensions of files whose changes trigger a solution reload.
    pub project_extensions: Vec<String>,
    /// Debounce window for solution reloads, in milliseconds.
    pub reload_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            solution_path: None,
            source_extensions: vec!["rs".into(), "txt".into(), "md".into()],
            project_extensions: vec!["toml".into(), "sln".into(), "csproj".into()],
            reload_debounce_ms: 5000,
        }
    }
}

impl Settings {
    /// Parse settings from `initializationOptions` or a configuration change.
    ///
    /// Accepts the bare object or one nested under [`SETTINGS_SECTION`].
    /// Anything unparseable falls back to the defaults.
    pub fn from_value(value: Option<serde_json::Value>) -> Self {
        let Some(mut value) = value else {
            return Self::default();
        };
        if let Some(nested) = value.get_mut(SETTINGS_SECTION) {
            value = nested.take();
        }
        if value.is_null() {
            return Self::default();
        }

        serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!("Ignoring invalid settings: {}", e);
            Self::default()
        })
    }

    /// The workspace root: the solution's directory, or `fallback`.
    pub fn workspace_root(&self, fallback: Option<&Path>) -> Option<PathBuf> {
        match &self.solution_path {
            Some(path) if path.is_dir() => Some(path.clone()),
            Some(path) => path.parent().map(Path::to_path_buf),
            None => fallback.map(Path::to_path_buf),
        }
    }

    /// The reload debounce window.
    pub fn reload_debounce(&self) -> Duration {
        Duration::from_millis(self.reload_debounce_ms)
    }
}

/// Timing knobs that are not user-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTuning {
    /// Interval between ticks.
    pub tick_interval: Duration,
    /// Delay before the first tick.
    pub initial_tick_delay: Duration,
    /// How long a document must go unchanged before its diagnostics run.
    pub diagnostics_settle: Duration,
    /// Queued pipeline events above which a tick only drains.
    pub diagnostics_backlog: usize,
    /// In-flight time after which a request is logged as long-running.
    pub long_running_threshold: Duration,
}

impl Default for ServerTuning {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            initial_tick_delay: Duration::from_millis(100),
            diagnostics_settle: Duration::from_millis(250),
            diagnostics_backlog: 64,
            long_running_threshold: Duration::from_secs(30),
        }
    }
}
