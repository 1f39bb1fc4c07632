//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name used for credential lookup.
const KEYRING_SERVICE: &str = "daily-relay";

/// Default upload budget: 8 MiB, the non-boosted Discord attachment limit.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 8 * 1024 * 1024;

/// Discord identifiers for the source, target, and notification role.
///
/// The bot token is loaded at runtime via OS keychain or environment
/// variable, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DiscordConfig {
    /// Channel whose history feeds the inventory.
    pub source_channel_id: u64,
    /// Channel receiving the daily post.
    pub target_channel_id: u64,
    /// Role mentioned on every daily post.
    pub notify_role_id: u64,
    /// Bot token (populated at runtime).
    #[serde(skip)]
    pub token: String,
}

/// Daily trigger time and timezone.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ScheduleConfig {
    /// IANA timezone the fire time is expressed in.
    #[serde(
        default = "default_timezone",
        deserialize_with = "deserialize_timezone"
    )]
    pub timezone: Tz,
    /// Wall-clock time of day (`HH:MM` or `HH:MM:SS`).
    #[serde(
        default = "default_fire_time",
        deserialize_with = "deserialize_fire_time"
    )]
    pub fire_time: NaiveTime,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            fire_time: default_fire_time(),
        }
    }
}

/// What to do when the origin record of a drawn item has disappeared.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OriginGonePolicy {
    /// Send the stale load-time URLs as plain links (never downloaded).
    #[default]
    StaleLinks,
    /// Send only the text body; skip the post when there is none.
    DropAttachments,
    /// Log and send nothing.
    Skip,
}

/// Attachment download and send limits.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DeliveryConfig {
    /// Total attachment bytes that may be uploaded inline in one post.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Timeout for each attachment download.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Timeout for each outbound send and record fetch.
    #[serde(default = "default_send_timeout_seconds")]
    pub send_timeout_seconds: u64,
    /// Fallback behavior when the origin record is gone.
    #[serde(default)]
    pub origin_gone_policy: OriginGonePolicy,
    /// Optional line printed above the origin link in the footer.
    #[serde(default)]
    pub footer_label: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            request_timeout_seconds: default_request_timeout_seconds(),
            send_timeout_seconds: default_send_timeout_seconds(),
            origin_gone_policy: OriginGonePolicy::default(),
            footer_label: None,
        }
    }
}

impl DeliveryConfig {
    /// Attachment download timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Send timeout as a [`Duration`].
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds)
    }
}

/// History scan pacing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LoaderConfig {
    /// Records processed between progress events.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    /// Pause after each progress event, in milliseconds.
    #[serde(default = "default_pace_millis")]
    pub pace_millis: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            progress_interval: default_progress_interval(),
            pace_millis: default_pace_millis(),
        }
    }
}

impl LoaderConfig {
    /// Pause duration between progress batches.
    #[must_use]
    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_millis)
    }
}

fn default_timezone() -> Tz {
    Tz::UTC
}

fn default_fire_time() -> NaiveTime {
    NaiveTime::from_hms_opt(21, 31, 0).unwrap_or(NaiveTime::MIN)
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_send_timeout_seconds() -> u64 {
    60
}

fn default_progress_interval() -> u64 {
    100
}

fn default_pace_millis() -> u64 {
    500
}

fn deserialize_timezone<'de, D>(deserializer: D) -> std::result::Result<Tz, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.trim()
        .parse::<Tz>()
        .map_err(|err| serde::de::Error::custom(format!("unknown timezone {raw:?}: {err}")))
}

fn deserialize_fire_time<'de, D>(deserializer: D) -> std::result::Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_fire_time(&raw).map_err(serde::de::Error::custom)
}

/// Parse a wall-clock time in `HH:MM:SS` or `HH:MM` form.
///
/// # Errors
///
/// Returns `AppError::Config` if neither format matches.
pub fn parse_fire_time(raw: &str) -> Result<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|err| AppError::Config(format!("invalid fire_time {raw:?}: {err}")))
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Discord identifiers.
    pub discord: DiscordConfig,
    /// Daily trigger settings.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Download and send limits.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// History scan pacing.
    #[serde(default)]
    pub loader: LoaderConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the Discord bot token from OS keychain with env-var fallback.
    ///
    /// Tries the `daily-relay` keyring service first, then falls back to
    /// the `DISCORD_TOKEN` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither source provides a token.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.discord.token = load_credential("discord_token", "DISCORD_TOKEN").await?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let ids = [
            ("discord.source_channel_id", self.discord.source_channel_id),
            ("discord.target_channel_id", self.discord.target_channel_id),
            ("discord.notify_role_id", self.discord.notify_role_id),
        ];
        for (name, value) in ids {
            if value == 0 {
                return Err(AppError::Config(format!("{name} must be non-zero")));
            }
        }

        if self.delivery.max_upload_bytes == 0 {
            return Err(AppError::Config(
                "delivery.max_upload_bytes must be greater than zero".into(),
            ));
        }

        if self.delivery.request_timeout_seconds == 0 || self.delivery.send_timeout_seconds == 0 {
            return Err(AppError::Config(
                "delivery timeouts must be greater than zero".into(),
            ));
        }

        if self.loader.progress_interval == 0 {
            return Err(AppError::Config(
                "loader.progress_interval must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.trim().is_empty() => return Ok(value.trim().to_owned()),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_owned()),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
