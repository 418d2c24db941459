//! Configuration types for duet.
//!
//! Settings live in a YAML file (`duet.yml` by default). Bot tokens may be
//! left out of the file and supplied through `DUET_IDENTITY_1_TOKEN` /
//! `DUET_IDENTITY_2_TOKEN` instead.

use crate::scenario::DaySelection;
use duet_proto::{ChannelId, UserId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Typing delays longer than this make a conversation crawl.
const MAX_SENSIBLE_TYPING_DELAY_SECS: u64 = 60;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuetConfig {
    /// Where the conversation happens.
    #[serde(default)]
    pub discord: DiscordConfig,

    /// The identity that opens the conversation when kickoff is enabled.
    #[serde(default)]
    pub identity_1: IdentityConfig,

    #[serde(default)]
    pub identity_2: IdentityConfig,

    /// Path to the scenario JSON file.
    #[serde(default = "default_scenarios_file")]
    pub scenarios_file: PathBuf,

    /// Day to play. `None` plays the first entry of the scenario file.
    #[serde(default)]
    pub day: Option<u32>,

    /// Seconds to show "typing" before each reply.
    #[serde(default = "default_typing_delay_secs")]
    pub typing_delay_secs: u64,

    #[serde(default)]
    pub kickoff: KickoffConfig,

    #[serde(default)]
    pub log: LogConfig,
}

fn default_scenarios_file() -> PathBuf {
    PathBuf::from("resources/scenarios.json")
}

fn default_typing_delay_secs() -> u64 {
    5
}

impl Default for DuetConfig {
    fn default() -> Self {
        Self {
            discord: DiscordConfig::default(),
            identity_1: IdentityConfig::default(),
            identity_2: IdentityConfig::default(),
            scenarios_file: default_scenarios_file(),
            day: None,
            typing_delay_secs: default_typing_delay_secs(),
            kickoff: KickoffConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Discord connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Channel both identities watch and post in.
    #[serde(default)]
    pub channel_id: u64,

    /// REST API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// How often to poll the channel for new messages.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            channel_id: 0,
            api_base: default_api_base(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl DiscordConfig {
    pub fn channel(&self) -> ChannelId {
        ChannelId(self.channel_id)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// One bot identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Account id the token is expected to belong to.
    #[serde(default)]
    pub id: u64,

    /// Bot token. Falls back to the identity's environment variable.
    #[serde(default)]
    pub token: Option<String>,
}

impl IdentityConfig {
    pub fn user_id(&self) -> UserId {
        UserId(self.id)
    }
}

/// Optional opening move by identity 1.
///
/// Agents only answer replies, so an empty channel never starts talking by
/// itself. With kickoff enabled, identity 1 posts `anchor` and then replies
/// to it with the first script line, which addresses identity 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickoffConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_anchor")]
    pub anchor: String,
}

fn default_anchor() -> String {
    "👋".to_string()
}

impl Default for KickoffConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            anchor: default_anchor(),
        }
    }
}

/// Output style for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info", "duet_core=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Also write logs (without colors) to this file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

impl DuetConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        let config: Self = serde_yaml::from_str(&content)?;
        debug!(
            channel = config.discord.channel_id,
            scenarios = %config.scenarios_file.display(),
            kickoff = config.kickoff.enabled,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Fills missing tokens from `DUET_IDENTITY_1_TOKEN` / `DUET_IDENTITY_2_TOKEN`.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env`](Self::apply_env) with a custom variable lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (label, identity) in [
            ("identity_1", &mut self.identity_1),
            ("identity_2", &mut self.identity_2),
        ] {
            if identity.token.as_deref().is_none_or(str::is_empty) {
                let key = token_env_var(label);
                if let Some(token) = lookup(&key).filter(|t| !t.is_empty()) {
                    debug!(identity = label, var = %key, "Using bot token from environment");
                    identity.token = Some(token);
                }
            }
        }
    }

    /// Token for `identity_1` or `identity_2`, or `MissingToken`.
    pub fn token(&self, label: &str) -> Result<&str, ConfigError> {
        let identity = match label {
            "identity_1" => &self.identity_1,
            "identity_2" => &self.identity_2,
            other => {
                return Err(ConfigError::InvalidValue {
                    field: other.to_string(),
                    message: "unknown identity".to_string(),
                });
            }
        };
        identity
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingToken {
                identity: label.to_string(),
            })
    }

    pub fn typing_delay(&self) -> Duration {
        Duration::from_secs(self.typing_delay_secs)
    }

    pub fn day_selection(&self) -> DaySelection {
        DaySelection::from(self.day)
    }

    /// Validates the configuration and returns warnings.
    ///
    /// Hard errors: missing tokens, a zero channel id, zero or identical identity ids.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        if self.discord.channel_id == 0 {
            return Err(ConfigError::InvalidValue {
                field: "discord.channel_id".to_string(),
                message: "must be set to the channel the identities talk in".to_string(),
            });
        }

        for (label, identity) in [("identity_1", &self.identity_1), ("identity_2", &self.identity_2)]
        {
            if identity.id == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("{label}.id"),
                    message: "must be set to the bot's user id".to_string(),
                });
            }
            self.token(label)?;
        }

        if self.identity_1.id == self.identity_2.id {
            return Err(ConfigError::InvalidValue {
                field: "identity_2.id".to_string(),
                message: "both identities have the same id".to_string(),
            });
        }

        let mut warnings = Vec::new();

        if self.kickoff.enabled && self.kickoff.anchor.trim().is_empty() {
            warnings.push(ConfigWarning::InvalidValue {
                field: "kickoff.anchor".to_string(),
                message: "empty anchor message will likely be rejected by Discord".to_string(),
            });
        }

        if self.typing_delay_secs > MAX_SENSIBLE_TYPING_DELAY_SECS {
            warnings.push(ConfigWarning::InvalidValue {
                field: "typing_delay_secs".to_string(),
                message: format!(
                    "{}s per reply is unusually slow (typing indicators expire after ~10s)",
                    self.typing_delay_secs
                ),
            });
        }

        if self.discord.poll_interval_ms < 500 {
            warnings.push(ConfigWarning::InvalidValue {
                field: "discord.poll_interval_ms".to_string(),
                message: "polling faster than every 500ms will hit rate limits".to_string(),
            });
        }

        Ok(warnings)
    }
}

/// Environment variable holding the token for `label`.
pub fn token_env_var(label: &str) -> String {
    format!("DUET_{}_TOKEN", label.to_uppercase())
}

/// Configuration warnings emitted during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Field has a questionable value.
    InvalidValue { field: String, message: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::InvalidValue { field, message } => {
                write!(f, "Warning [{}]: {}", field, message)
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("No bot token for {identity}: set it in the config or via {}", token_env_var(.identity))]
    MissingToken { identity: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}
