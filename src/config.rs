use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Lower bound for the poll interval. Anything tighter just hammers
/// the backend with full-state requests.
pub const MIN_INTERVAL_MS: u64 = 100;

/// Lower bound for the per-request timeout. A zero timeout would fail
/// every fetch before it could connect.
pub const MIN_TIMEOUT_MS: u64 = 100;

/// Environment variable overriding `monitor.base_url`.
pub const BASE_URL_ENV: &str = "MONITOR_BASE_URL";

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level structure loaded from `config.json`.
//
// It defines:
// - Where the monitor snapshot is fetched from and how often
// - Optional debug configuration
//
// Every field has a default, so an empty object (or no file at
// all) yields a working local setup.
//
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Backend endpoint and polling cadence
    pub monitor: MonitorConfig,

    /// Optional debug configuration
    pub debug: Option<DebugConfig>,
}

// ------------------------------------------------------------
// Monitor configuration
// ------------------------------------------------------------
//
// Notes:
// - `interval_ms` is clamped to MIN_INTERVAL_MS, `timeout_ms` to
//   MIN_TIMEOUT_MS.
// - `timeout_ms` bounds a single fetch; without it a hung backend
//   would leave the scheduler in the Polling state forever and every
//   later tick would be skipped.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    /// Backend base URL, e.g. "http://127.0.0.1:8000"
    pub base_url: String,

    /// Snapshot path appended to `base_url`
    pub path: String,

    /// Poll interval in milliseconds
    pub interval_ms: u64,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            path: "/monitor/all".to_string(),
            interval_ms: 1000,
            timeout_ms: 5000,
        }
    }
}

impl MonitorConfig {
    /// Full snapshot URL.
    pub fn snapshot_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(MIN_INTERVAL_MS))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(MIN_TIMEOUT_MS))
    }
}

// ------------------------------------------------------------
// Debug configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DebugConfig {
    /// Log a change summary for every successful poll at info level
    pub log: Option<bool>,

    /// Seconds between `[METRICS]` lines (default 10)
    pub metrics_interval_secs: Option<u64>,
}

impl Config {
    pub fn debug_log(&self) -> bool {
        self.debug.as_ref().is_some_and(|d| d.log.unwrap_or(false))
    }

    pub fn metrics_interval(&self) -> Duration {
        let secs = self
            .debug
            .as_ref()
            .and_then(|d| d.metrics_interval_secs)
            .unwrap_or(10);
        Duration::from_secs(secs.max(1))
    }

    /// Applies environment overrides on top of the file values.
    pub fn with_env_overrides(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.monitor.base_url = url;
        }
        self
    }
}

/// Reads a JSON configuration file from disk.
///
/// A missing file is not an error: the defaults point at a local
/// backend. A file that exists but does not parse is.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let cfg = match fs::read_to_string(path) {
        Ok(data) => serde_json::from_str::<Config>(&data)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::info!("no config at {}, using defaults", path.display());
            Config::default()
        }
        Err(e) => return Err(e.into()),
    };
    Ok(cfg.with_env_overrides(std::env::var(BASE_URL_ENV).ok()))
}
