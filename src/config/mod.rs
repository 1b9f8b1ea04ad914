//! Configuration management for Rafiq
//!
//! Values are layered: environment (`RAFIQ_*`) over the TOML file over
//! built-in defaults. Command-line flags are applied on top by the caller.

pub mod file;

use std::collections::HashMap;
use std::time::Duration;

use crate::confirm::MAX_CONFIRM_TIMEOUT;
use crate::device::DeviceTier;
use crate::emergency::{EmergencyConfig, regional_services};
use crate::governor::{GovernorConfig, TaskCategory};
use crate::intent::InteractionMode;
use crate::router::RouterConfig;
use crate::session::SessionConfig;
use crate::voice::DEFAULT_WAKE_PHRASES;
use crate::{Error, Result};

use file::RafiqConfigFile;

/// Rafiq configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Tier override; probed from the hardware when `None`
    pub tier: Option<DeviceTier>,

    pub mode: InteractionMode,

    /// Phrases that wake the assistant
    pub wake_phrases: Vec<String>,

    pub governor: GovernorConfig,
    pub router: RouterConfig,
    pub session: SessionConfig,
    pub emergency: EmergencyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tier: None,
            mode: InteractionMode::default(),
            wake_phrases: DEFAULT_WAKE_PHRASES.iter().map(ToString::to_string).collect(),
            governor: GovernorConfig::default(),
            router: RouterConfig::default(),
            session: SessionConfig::default(),
            emergency: EmergencyConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        Self::load_with_options(None, InteractionMode::default())
    }

    /// Load configuration, then apply command-line overrides
    ///
    /// Mode flags given on the command line can only switch a mode on.
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load_with_options(tier: Option<DeviceTier>, mode: InteractionMode) -> Result<Self> {
        let fc = file::load_config_file();
        let mut config = Self::layered(fc, |key| std::env::var(key).ok())?;

        if tier.is_some() {
            config.tier = tier;
        }
        config.mode.senior |= mode.senior;
        config.mode.privacy |= mode.privacy;
        config.session.mode = config.mode;

        Ok(config)
    }

    /// Merge environment over file over defaults
    #[allow(clippy::too_many_lines)]
    pub(crate) fn layered(fc: RafiqConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let tier = env("RAFIQ_TIER")
            .or(fc.device.tier)
            .map(|t| t.parse::<DeviceTier>())
            .transpose()?;

        let mode = InteractionMode {
            senior: env_flag(&env, "RAFIQ_SENIOR")
                .or(fc.mode.senior)
                .unwrap_or(false),
            privacy: env_flag(&env, "RAFIQ_PRIVACY")
                .or(fc.mode.privacy)
                .unwrap_or(false),
        };

        let wake_phrases = env("RAFIQ_WAKE_PHRASES")
            .map(|v| {
                v.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
            })
            .or(fc.wake.phrases)
            .filter(|p| !p.is_empty())
            .unwrap_or(defaults.wake_phrases);

        let mut requested = HashMap::new();
        for (category, value) in [
            (TaskCategory::Inference, fc.governor.inference),
            (TaskCategory::Audio, fc.governor.audio),
            (TaskCategory::Network, fc.governor.network),
            (TaskCategory::FileIo, fc.governor.file_io),
            (TaskCategory::General, fc.governor.general),
        ] {
            if let Some(value) = value {
                requested.insert(category, value.max(1));
            }
        }
        let governor = GovernorConfig {
            requested,
            max_queued: fc.governor.max_queued.or(defaults.governor.max_queued),
        };

        let prefer_local_ratio = env_parse(&env, "RAFIQ_PREFER_LOCAL_RATIO")
            .or(fc.router.prefer_local_ratio)
            .unwrap_or(defaults.router.prefer_local_ratio);
        if !(0.0..=1.0).contains(&prefer_local_ratio) {
            return Err(Error::Config(format!(
                "prefer_local_ratio must be within 0..=1, got {prefer_local_ratio}"
            )));
        }

        let router = RouterConfig {
            window: fc.router.window.unwrap_or(defaults.router.window).max(1),
            prefer_local_ratio,
            remote_timeout: env_parse(&env, "RAFIQ_REMOTE_TIMEOUT_MS")
                .or(fc.router.remote_timeout_ms)
                .map_or(defaults.router.remote_timeout, Duration::from_millis),
            feedback_capacity: fc
                .router
                .feedback_capacity
                .unwrap_or(defaults.router.feedback_capacity),
        };

        let session = SessionConfig {
            capture_timeout: env_parse(&env, "RAFIQ_CAPTURE_TIMEOUT_MS")
                .or(fc.session.capture_timeout_ms)
                .map_or(defaults.session.capture_timeout, Duration::from_millis),
            confirm_timeout: env_parse(&env, "RAFIQ_CONFIRM_TIMEOUT_MS")
                .or(fc.session.confirm_timeout_ms)
                .map_or(defaults.session.confirm_timeout, Duration::from_millis)
                .min(MAX_CONFIRM_TIMEOUT),
            execution_timeout: env_parse(&env, "RAFIQ_EXECUTION_TIMEOUT_MS")
                .or(fc.session.execution_timeout_ms)
                .map_or(defaults.session.execution_timeout, Duration::from_millis),
            cooldown: env_parse(&env, "RAFIQ_COOLDOWN_MS")
                .or(fc.session.cooldown_ms)
                .map_or(defaults.session.cooldown, Duration::from_millis),
            mode,
        };

        let emergency = EmergencyConfig {
            contacts: fc.emergency.contacts,
            services: if fc.emergency.regional_services.unwrap_or(true) {
                regional_services()
            } else {
                Vec::new()
            },
            answer_window: env_parse(&env, "RAFIQ_ANSWER_WINDOW_SECS")
                .or(fc.emergency.answer_window_secs)
                .map_or(defaults.emergency.answer_window, Duration::from_secs),
            retry_cooldown: env_parse(&env, "RAFIQ_RETRY_COOLDOWN_SECS")
                .or(fc.emergency.retry_cooldown_secs)
                .map_or(defaults.emergency.retry_cooldown, Duration::from_secs),
            confirm_timeout: defaults.emergency.confirm_timeout,
            alert_message: fc
                .emergency
                .alert_message
                .unwrap_or(defaults.emergency.alert_message),
            fall_alert_message: fc
                .emergency
                .fall_alert_message
                .unwrap_or(defaults.emergency.fall_alert_message),
            guardian: fc.emergency.guardian,
        };

        Ok(Self {
            tier,
            mode,
            wake_phrases,
            governor,
            router,
            session,
            emergency,
        })
    }
}

fn env_flag(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    env(key).map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
}

fn env_parse<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}
