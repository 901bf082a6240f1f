//! Bot configuration
//!
//! Settings come from a YAML file (`config/warden.yaml`, or the path in
//! `WARDEN_CONFIG`) with environment variables layered on top. Secrets such
//! as the bot token are only read from the environment.

use crate::moderation::{MAX_TIMEOUT_MINUTES, ModerationDefaults};
use crate::policy::{DEFAULT_EMOJI_THRESHOLD, Policy};
use crate::verify::BLOXLINK_API_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file location
pub const CONFIG_FILE: &str = "config/warden.yaml";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("{key} must be a non-zero Discord id")]
    ZeroId { key: &'static str },

    #[error("moderation.timeout_minutes must be between 1 and {MAX_TIMEOUT_MINUTES}, got {0}")]
    TimeoutOutOfRange(u64),
}

/// Automod filter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomodSettings {
    pub enabled: bool,
    pub emoji_threshold: usize,
}

impl Default for AutomodSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            emoji_threshold: DEFAULT_EMOJI_THRESHOLD,
        }
    }
}

/// Moderation defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationSettings {
    pub default_reason: String,
    pub timeout_minutes: u64,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            default_reason: "No reason provided".to_string(),
            timeout_minutes: 10,
        }
    }
}

/// Ticket panel and support roles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketSettings {
    pub panel_channel_id: Option<u64>,
    pub general_role_id: Option<u64>,
    pub management_role_id: Option<u64>,
    pub internal_role_id: Option<u64>,
}

/// Dashboard API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    pub enabled: bool,
    pub bind: String,
    /// Bearer tokens accepted by the staff gate
    pub api_tokens: Vec<String>,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:3000".to_string(),
            api_tokens: Vec::new(),
        }
    }
}

/// Bloxlink account verification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub api_url: String,
    /// Only read from `BLOXLINK_API_KEY`; verification is off without it
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            api_url: BLOXLINK_API_URL.to_string(),
            api_key: None,
        }
    }
}

/// Top-level bot settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub guild_id: Option<u64>,
    pub staff_roles: Vec<u64>,
    pub mod_log_channel_id: Option<u64>,
    pub data_dir: PathBuf,
    pub automod: AutomodSettings,
    pub moderation: ModerationSettings,
    pub tickets: TicketSettings,
    pub dashboard: DashboardSettings,
    pub verification: VerificationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            guild_id: None,
            staff_roles: Vec::new(),
            mod_log_channel_id: None,
            data_dir: PathBuf::from("data"),
            automod: AutomodSettings::default(),
            moderation: ModerationSettings::default(),
            tickets: TicketSettings::default(),
            dashboard: DashboardSettings::default(),
            verification: VerificationSettings::default(),
        }
    }
}

fn parse_id(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| ConfigError::InvalidEnv {
            key,
            value: value.to_string(),
        })
}

impl Settings {
    /// Load settings from the configured file and the process environment
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed, or an
    /// environment override is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("WARDEN_CONFIG").unwrap_or_else(|_| CONFIG_FILE.to_string());
        let mut settings = Self::from_file(Path::new(&path))?;
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject ids and lengths the Discord client cannot take
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroId` for the first id that is `0`, or
    /// `ConfigError::TimeoutOutOfRange` for a default timeout outside Discord's cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ids = [
            ("guild_id", self.guild_id),
            ("mod_log_channel_id", self.mod_log_channel_id),
            ("tickets.panel_channel_id", self.tickets.panel_channel_id),
            ("tickets.general_role_id", self.tickets.general_role_id),
            ("tickets.management_role_id", self.tickets.management_role_id),
            ("tickets.internal_role_id", self.tickets.internal_role_id),
        ];
        if let Some((key, _)) = ids.into_iter().find(|(_, id)| *id == Some(0)) {
            return Err(ConfigError::ZeroId { key });
        }
        if self.staff_roles.contains(&0) {
            return Err(ConfigError::ZeroId { key: "staff_roles" });
        }

        let minutes = self.moderation.timeout_minutes;
        if minutes == 0 || minutes > MAX_TIMEOUT_MINUTES {
            return Err(ConfigError::TimeoutOutOfRange(minutes));
        }
        Ok(())
    }

    /// Read settings from a YAML file; a missing file yields defaults
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse settings from YAML text
    ///
    /// # Errors
    /// Returns the YAML error if the text does not describe `Settings`.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Layer environment overrides on top of the file settings
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidEnv` if an id or port is not a number.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("GUILD_ID") {
            self.guild_id = Some(parse_id("GUILD_ID", &value)?);
        }
        for key in ["STAFF_ROLE_1", "STAFF_ROLE_2"] {
            if let Some(value) = get(key) {
                let role = parse_id(key, &value)?;
                if !self.staff_roles.contains(&role) {
                    self.staff_roles.push(role);
                }
            }
        }
        if let Some(value) = get("MOD_LOG_CHANNEL") {
            self.mod_log_channel_id = Some(parse_id("MOD_LOG_CHANNEL", &value)?);
        }
        if let Some(value) = get("DATA_DIR") {
            self.data_dir = PathBuf::from(value);
        }
        if let Some(value) = get("DASHBOARD_TOKEN") {
            if !self.dashboard.api_tokens.contains(&value) {
                self.dashboard.api_tokens.push(value);
            }
        }
        if let Some(value) = get("BLOXLINK_API_KEY") {
            self.verification.api_key = Some(value.trim().to_string());
        }
        if let Some(value) = get("PORT") {
            let port = value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: "PORT",
                    value: value.clone(),
                })?;
            let host = self
                .dashboard
                .bind
                .rsplit_once(':')
                .map_or("0.0.0.0", |(host, _)| host)
                .to_string();
            self.dashboard.bind = format!("{host}:{port}");
        }

        Ok(())
    }

    /// Whether any of the given roles is a staff role
    #[must_use]
    pub fn is_staff(&self, roles: &[u64]) -> bool {
        roles.iter().any(|role| self.staff_roles.contains(role))
    }

    #[must_use]
    pub fn policy(&self) -> Policy {
        Policy {
            emoji_threshold: self.automod.emoji_threshold,
        }
    }

    #[must_use]
    pub fn moderation_defaults(&self) -> ModerationDefaults {
        ModerationDefaults {
            default_reason: self.moderation.default_reason.clone(),
            timeout: Duration::from_secs(self.moderation.timeout_minutes * 60),
        }
    }
}
