//! Settings store
//!
//! A TOML file under the user's config directory holds the watch and output
//! folders, the pause/auto-start flags and watcher tuning. A missing file
//! means defaults; every field may be omitted.

use anyhow::{Context, Result};
use gridstitch_watcher::WatchConfig;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable naming an alternative config file
pub const CONFIG_ENV: &str = "GRIDSTITCH_CONFIG";

static PATH_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be within {min}..={max} (got {value})")]
    OutOfRange {
        key: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("watcher.single_hold_ms ({hold}) must not be shorter than watcher.debounce_ms ({debounce})")]
    HoldShorterThanDebounce { hold: u64, debounce: u64 },
    #[error("settings.watch_folder must not be empty")]
    EmptyWatchFolder,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub settings: Settings,
    pub watcher: WatcherSettings,
    pub ledger: LedgerSettings,
}

/// Values the desktop shell used to keep in its key-value store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub watch_folder: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_folder: Option<PathBuf>,
    pub is_paused: bool,
    pub auto_start: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    pub debounce_ms: u64,
    pub single_hold_ms: u64,
    pub stability_ms: u64,
    pub poll_interval_ms: u64,
    pub max_depth: u64,
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// 0 disables periodic cleanup
    pub cleanup_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watch_folder: default_watch_folder(),
            output_folder: None,
            is_paused: false,
            auto_start: true,
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 5_000,
            single_hold_ms: 10_000,
            stability_ms: 2_000,
            poll_interval_ms: 100,
            max_depth: 99,
            ignore_patterns: Vec::new(),
        }
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 3_600,
        }
    }
}

fn default_watch_folder() -> PathBuf {
    dirs::picture_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn check_range(key: &'static str, value: u64, min: u64, max: u64) -> std::result::Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { key, value, min, max })
    }
}

impl SystemConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.settings.watch_folder.as_os_str().is_empty() {
            return Err(ConfigError::EmptyWatchFolder);
        }

        let w = &self.watcher;
        check_range("watcher.debounce_ms", w.debounce_ms, 100, 600_000)?;
        check_range("watcher.stability_ms", w.stability_ms, 0, 60_000)?;
        check_range("watcher.poll_interval_ms", w.poll_interval_ms, 10, 5_000)?;
        check_range("watcher.max_depth", w.max_depth, 1, 255)?;
        if w.single_hold_ms < w.debounce_ms {
            return Err(ConfigError::HoldShorterThanDebounce {
                hold: w.single_hold_ms,
                debounce: w.debounce_ms,
            });
        }
        Ok(())
    }

    /// Watcher tuning in the form the watcher crate takes
    pub fn watch_config(&self) -> WatchConfig {
        let w = &self.watcher;
        WatchConfig {
            debounce: Duration::from_millis(w.debounce_ms),
            single_hold: Duration::from_millis(w.single_hold_ms),
            stability: Duration::from_millis(w.stability_ms),
            poll_interval: Duration::from_millis(w.poll_interval_ms),
            max_depth: w.max_depth as usize,
            output_folder: self.settings.output_folder.clone(),
            ignore_patterns: w.ignore_patterns.clone(),
        }
    }

    /// Canonical watch folder
    ///
    /// Native watchers report resolved paths, so a folder reached through a
    /// symlink must be resolved before paths are compared against it.
    pub fn watch_root(&self) -> Result<PathBuf> {
        let folder = &self.settings.watch_folder;
        if !folder.is_dir() {
            anyhow::bail!("Watch folder does not exist: {}", folder.display());
        }
        std::fs::canonicalize(folder)
            .with_context(|| format!("Failed to resolve watch folder {}", folder.display()))
    }

    pub fn cleanup_interval(&self) -> Option<Duration> {
        match self.ledger.cleanup_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Every key accepted by [`get`](Self::get) and [`set`](Self::set)
    pub const KEYS: &'static [&'static str] = &[
        "settings.watch_folder",
        "settings.output_folder",
        "settings.is_paused",
        "settings.auto_start",
        "watcher.debounce_ms",
        "watcher.single_hold_ms",
        "watcher.stability_ms",
        "watcher.poll_interval_ms",
        "watcher.max_depth",
        "watcher.ignore_patterns",
        "ledger.cleanup_interval_secs",
    ];

    /// Read a value by dotted key
    pub fn get(&self, key: &str) -> Result<String> {
        let value = match key {
            "settings.watch_folder" => self.settings.watch_folder.display().to_string(),
            "settings.output_folder" => self
                .settings
                .output_folder
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            "settings.is_paused" => self.settings.is_paused.to_string(),
            "settings.auto_start" => self.settings.auto_start.to_string(),
            "watcher.debounce_ms" => self.watcher.debounce_ms.to_string(),
            "watcher.single_hold_ms" => self.watcher.single_hold_ms.to_string(),
            "watcher.stability_ms" => self.watcher.stability_ms.to_string(),
            "watcher.poll_interval_ms" => self.watcher.poll_interval_ms.to_string(),
            "watcher.max_depth" => self.watcher.max_depth.to_string(),
            "watcher.ignore_patterns" => self.watcher.ignore_patterns.join(","),
            "ledger.cleanup_interval_secs" => self.ledger.cleanup_interval_secs.to_string(),
            _ => anyhow::bail!(
                "Unknown config key: {}. Use 'gridstitch config list' to see available keys.",
                key
            ),
        };
        Ok(value)
    }

    /// Set a value by dotted key, validating the result
    ///
    /// An empty output folder clears it; ignore patterns are comma separated.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        match key {
            "settings.watch_folder" => next.settings.watch_folder = PathBuf::from(value),
            "settings.output_folder" => {
                next.settings.output_folder = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "settings.is_paused" => next.settings.is_paused = parse_bool(value)?,
            "settings.auto_start" => next.settings.auto_start = parse_bool(value)?,
            "watcher.debounce_ms" => next.watcher.debounce_ms = parse_u64(value)?,
            "watcher.single_hold_ms" => next.watcher.single_hold_ms = parse_u64(value)?,
            "watcher.stability_ms" => next.watcher.stability_ms = parse_u64(value)?,
            "watcher.poll_interval_ms" => next.watcher.poll_interval_ms = parse_u64(value)?,
            "watcher.max_depth" => next.watcher.max_depth = parse_u64(value)?,
            "watcher.ignore_patterns" => {
                next.watcher.ignore_patterns = value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect();
            }
            "ledger.cleanup_interval_secs" => next.ledger.cleanup_interval_secs = parse_u64(value)?,
            _ => anyhow::bail!(
                "Unknown config key: {}. Use 'gridstitch config list' to see available keys.",
                key
            ),
        }

        next.validate().context("Invalid configuration value")?;
        *self = next;
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => anyhow::bail!("Invalid value: must be 'true' or 'false'"),
    }
}

fn parse_u64(value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .context("Invalid value: must be a non-negative integer")
}

/// Use `path` instead of the default location for this process
///
/// Only the first call has an effect.
pub fn set_path_override(path: PathBuf) {
    let _ = PATH_OVERRIDE.set(path);
}

/// Resolve the config file location
///
/// Order: explicit override, `GRIDSTITCH_CONFIG`, then
/// `<config_dir>/gridstitch/config.toml`.
pub fn config_file_path() -> Result<PathBuf> {
    if let Some(path) = PATH_OVERRIDE.get() {
        return Ok(path.clone());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|d| d.join("gridstitch").join("config.toml"))
        .context("Could not determine config directory")
}

/// Directory for logs and other per-user state
pub fn state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("gridstitch"))
        .unwrap_or_else(|| std::env::temp_dir().join("gridstitch"))
}

pub fn load() -> Result<SystemConfig> {
    load_from(&config_file_path()?)
}

pub fn save(config: &SystemConfig) -> Result<()> {
    save_to(&config_file_path()?, config)
}

/// Load from `path`, returning defaults if it does not exist
pub fn load_from(path: &Path) -> Result<SystemConfig> {
    if !path.exists() {
        return Ok(SystemConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: SystemConfig = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(config)
}

/// Write `config` to `path` atomically
pub fn save_to(path: &Path, config: &SystemConfig) -> Result<()> {
    config.validate().context("Refusing to save invalid configuration")?;
    let serialized = toml::to_string_pretty(config).context("Failed to serialize config")?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .with_context(|| format!("Failed to create config directory {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).context("Failed to create temp config file")?;
    tmp.write_all(serialized.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write config file {}", path.display()))?;
    Ok(())
}

/// Write the default config if no file exists yet
pub fn init_if_missing() -> Result<PathBuf> {
    let path = config_file_path()?;
    if !path.exists() {
        save_to(&path, &SystemConfig::default())?;
    }
    Ok(path)
}

/// Annotated config with every default spelled out
pub fn example_config() -> &'static str {
    r#"# Gridstitch configuration

[settings]
# Folder watched recursively for new images
watch_folder = "/home/you/Pictures"
# Where composites go; omit to use a Processed/ folder next to the inputs
# output_folder = "/home/you/Pictures/Stitched"
is_paused = false
# Stored for the login-item integration
auto_start = true

[watcher]
# Quiet time after the last arrival in a folder before it is grouped (100-600000)
debounce_ms = 5000
# How long a lone image waits for a partner (>= debounce_ms)
single_hold_ms = 10000
# A new file must keep the same size this long before it counts (0-60000)
stability_ms = 2000
# How often unsettled files are re-checked (10-5000)
poll_interval_ms = 100
# Folder nesting limit below the watch folder (1-255)
max_depth = 99
# Extra gitignore-style patterns
ignore_patterns = []

[ledger]
# Drop records whose source files are gone; 0 disables
cleanup_interval_secs = 3600
"#
}
