//! TOML configuration file loading
//!
//! Supports `~/.config/rafiq/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::emergency::EmergencyContact;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct RafiqConfigFile {
    /// Hardware tier override
    #[serde(default)]
    pub device: DeviceFileConfig,

    /// Senior and privacy flags
    #[serde(default)]
    pub mode: ModeFileConfig,

    /// Wake phrases
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Pool size requests
    #[serde(default)]
    pub governor: GovernorFileConfig,

    /// Routing tuning
    #[serde(default)]
    pub router: RouterFileConfig,

    /// Session timing
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Emergency contacts and timing
    #[serde(default)]
    pub emergency: EmergencyFileConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceFileConfig {
    /// "low", "mid", "high" or "elite"; probed when unset
    pub tier: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModeFileConfig {
    pub senior: Option<bool>,
    pub privacy: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Phrases that wake the assistant (e.g. "يا صاحبي")
    pub phrases: Option<Vec<String>>,
}

/// Requested workers per pool, capped by the device tier
#[derive(Debug, Default, Deserialize)]
pub struct GovernorFileConfig {
    pub inference: Option<usize>,
    pub audio: Option<usize>,
    pub network: Option<usize>,
    pub file_io: Option<usize>,
    pub general: Option<usize>,

    /// Tasks allowed to wait per pool before work is refused; unbounded when unset
    pub max_queued: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RouterFileConfig {
    /// Attempts per preference window
    pub window: Option<usize>,

    /// Local success rate above which local is preferred
    pub prefer_local_ratio: Option<f32>,

    pub remote_timeout_ms: Option<u64>,
    pub feedback_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    pub capture_timeout_ms: Option<u64>,
    pub confirm_timeout_ms: Option<u64>,
    pub execution_timeout_ms: Option<u64>,
    pub cooldown_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmergencyFileConfig {
    /// People to call before the public services
    #[serde(default)]
    pub contacts: Vec<EmergencyContact>,

    /// Dial the regional services after the contacts (default true)
    pub regional_services: Option<bool>,

    pub answer_window_secs: Option<u64>,
    pub retry_cooldown_secs: Option<u64>,

    /// Text sent to contacts when an emergency starts
    pub alert_message: Option<String>,

    /// Text sent instead when a fall started the emergency
    pub fall_alert_message: Option<String>,

    /// Texted during emergencies in senior mode
    pub guardian: Option<EmergencyContact>,
}

/// Load the TOML config file from the standard path
///
/// Returns `RafiqConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> RafiqConfigFile {
    config_file_path().map_or_else(RafiqConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Returns `RafiqConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file_from(path: &Path) -> RafiqConfigFile {
    if !path.exists() {
        return RafiqConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                RafiqConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            RafiqConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/rafiq/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("rafiq").join("config.toml"))
}
