use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::client::ClientOptions;
use crate::ai::gemini::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::ai::Symbol;
use crate::indicator::IndicatorKey;
use crate::signal::{SignalTable, SignalTiming, MAX_FLASHES};

/// Overrides the settings file location.
pub const CONFIG_ENV: &str = "CAPSIGNAL_CONFIG";
/// Takes precedence over `api_key` in the settings file.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid setting: {0}")]
    Invalid(String),
    #[error("No API key: set GEMINI_API_KEY or api_key in the settings file")]
    MissingApiKey,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Key code understood by the hotkey backend, e.g. "Equal" or "F8".
    pub trigger_key: String,
    pub suppress_trigger: bool,
    pub indicator: IndicatorKey,
    pub model: String,
    pub api_key: String,
    pub endpoint: String,
    pub request_timeout_secs: u64,
    pub max_image_width: u32,
    pub jpeg_quality: u8,
    pub signal_on_ms: u64,
    pub signal_off_ms: u64,
    pub signal_pause_ms: u64,
    /// Answer letter → flash count.
    pub signal_table: BTreeMap<String, u32>,
    pub idle_tick_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trigger_key: "Equal".into(),
            suppress_trigger: true,
            indicator: IndicatorKey::default(),
            model: DEFAULT_MODEL.into(),
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.into(),
            request_timeout_secs: 90,
            max_image_width: 2048,
            jpeg_quality: 85,
            signal_on_ms: 150,
            signal_off_ms: 150,
            signal_pause_ms: 500,
            signal_table: ('A'..='F').map(String::from).zip(1..).collect(),
            idle_tick_ms: 500,
            shutdown_grace_ms: 100,
        }
    }
}

// Hand-written so the key never ends up in a log line.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("trigger_key", &self.trigger_key)
            .field("suppress_trigger", &self.suppress_trigger)
            .field("indicator", &self.indicator)
            .field("model", &self.model)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .field("endpoint", &self.endpoint)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_image_width", &self.max_image_width)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("signal_on_ms", &self.signal_on_ms)
            .field("signal_off_ms", &self.signal_off_ms)
            .field("signal_pause_ms", &self.signal_pause_ms)
            .field("signal_table", &self.signal_table)
            .field("idle_tick_ms", &self.idle_tick_ms)
            .field("shutdown_grace_ms", &self.shutdown_grace_ms)
            .finish()
    }
}

/// `$CAPSIGNAL_CONFIG`, else `<config dir>/capsignal/settings.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("capsignal").join("settings.toml"))
}

impl Settings {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::warn!("No config directory on this platform; using default settings");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("No settings at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trigger_key.trim().is_empty() {
            return Err(ConfigError::Invalid("trigger_key is empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model is empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be > 0".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "jpeg_quality {} is outside 1..=100",
                self.jpeg_quality
            )));
        }
        if self.idle_tick_ms == 0 {
            return Err(ConfigError::Invalid("idle_tick_ms must be > 0".into()));
        }
        self.signal_table().map(|_| ())
    }

    /// The configured table, checked: non-empty, single ASCII letters,
    /// counts within `1..=MAX_FLASHES`, no letter listed twice
    /// (case-insensitively).
    pub fn signal_table(&self) -> Result<SignalTable, ConfigError> {
        if self.signal_table.is_empty() {
            return Err(ConfigError::Invalid("signal_table is empty".into()));
        }
        let mut counts = BTreeMap::new();
        for (key, &count) in &self.signal_table {
            let mut chars = key.chars();
            let symbol = match (chars.next(), chars.next()) {
                (Some(c), None) => Symbol::new(c),
                _ => None,
            }
            .ok_or_else(|| {
                ConfigError::Invalid(format!("signal_table key '{}' is not a single letter", key))
            })?;
            if !(1..=MAX_FLASHES).contains(&count) {
                return Err(ConfigError::Invalid(format!(
                    "signal_table count for '{}' must be within 1..={}, got {}",
                    key, MAX_FLASHES, count
                )));
            }
            if counts.insert(symbol, count).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "signal_table lists '{}' twice",
                    symbol
                )));
            }
        }
        Ok(SignalTable::new(counts))
    }

    pub fn signal_timing(&self) -> SignalTiming {
        SignalTiming {
            on: Duration::from_millis(self.signal_on_ms),
            off: Duration::from_millis(self.signal_off_ms),
            pause: Duration::from_millis(self.signal_pause_ms),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.request_timeout_secs),
            max_image_width: self.max_image_width,
            jpeg_quality: self.jpeg_quality,
        }
    }

    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// `$GEMINI_API_KEY` if set, else the file's `api_key`.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        self.resolve_api_key(std::env::var(API_KEY_ENV).ok())
    }

    fn resolve_api_key(&self, from_env: Option<String>) -> Result<String, ConfigError> {
        from_env
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .or_else(|| Some(self.api_key.trim().to_string()).filter(|k| !k.is_empty()))
            .ok_or(ConfigError::MissingApiKey)
    }
}
