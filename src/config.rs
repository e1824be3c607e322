//! Configuration types.
//!
//! Everything is read from the process environment. `main` loads an optional
//! `.env` file first, so the same variables can live there.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default location of the persisted user records.
pub const DEFAULT_USER_DATA_PATH: &str = "user_data.json";
/// Default greeting picture sent with the first prompt.
pub const DEFAULT_GREETING_PHOTO: &str = "ekolina.jpg";
/// Default pause between scripted messages.
pub const DEFAULT_MESSAGE_DELAY_MS: u64 = 1500;

/// Which transport the bot talks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Telegram,
    Cli,
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram bot credential.
    pub bot_token: SecretString,
    /// Users allowed to broadcast.
    pub admin_ids: HashSet<i64>,
    /// JSON file holding all user records.
    pub user_data_path: PathBuf,
    /// Picture attached to the greeting. `None` sends a text-only greeting.
    pub greeting_photo: Option<PathBuf>,
    /// Pause between scripted worksheet messages.
    pub message_delay: Duration,
    pub channel: ChannelKind,
    /// User id the CLI channel speaks as.
    pub cli_user_id: i64,
}

impl BotConfig {
    /// Build the config from environment variables.
    ///
    /// A missing token or admin list is fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("TELEGRAM_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_TOKEN".into()))?;

        let raw_admins = lookup("ADMIN_IDS")
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("ADMIN_IDS".into()))?;
        let admin_ids = parse_admin_ids(&raw_admins)?;

        let user_data_path = lookup("EKOLINA_USER_DATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_USER_DATA_PATH));

        let greeting_photo = lookup("EKOLINA_GREETING_PHOTO")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GREETING_PHOTO));
        let greeting_photo = if greeting_photo.exists() {
            Some(greeting_photo)
        } else {
            tracing::warn!(
                path = %greeting_photo.display(),
                "Greeting photo not found, falling back to text greeting"
            );
            None
        };

        let message_delay = match lookup("EKOLINA_MESSAGE_DELAY_MS") {
            Some(raw) => {
                let ms = raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                    key: "EKOLINA_MESSAGE_DELAY_MS".into(),
                    message: e.to_string(),
                })?;
                Duration::from_millis(ms)
            }
            None => Duration::from_millis(DEFAULT_MESSAGE_DELAY_MS),
        };

        let channel = match lookup("EKOLINA_CHANNEL").as_deref().map(str::trim) {
            None | Some("") | Some("telegram") => ChannelKind::Telegram,
            Some("cli") => ChannelKind::Cli,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "EKOLINA_CHANNEL".into(),
                    message: format!("unknown channel '{other}' (expected telegram or cli)"),
                });
            }
        };

        let cli_user_id = match lookup("EKOLINA_CLI_USER_ID") {
            Some(raw) => raw.trim().parse::<i64>().map_err(|e| ConfigError::InvalidValue {
                key: "EKOLINA_CLI_USER_ID".into(),
                message: e.to_string(),
            })?,
            None => 1,
        };

        Ok(Self {
            bot_token: SecretString::from(token),
            admin_ids,
            user_data_path,
            greeting_photo,
            message_delay,
            channel,
            cli_user_id,
        })
    }

    /// Whether `user_id` may broadcast.
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

/// Parse a comma-separated list of numeric user ids.
fn parse_admin_ids(raw: &str) -> Result<HashSet<i64>, ConfigError> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|e| ConfigError::InvalidValue {
                key: "ADMIN_IDS".into(),
                message: format!("'{s}': {e}"),
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;

    if ids.is_empty() {
        return Err(ConfigError::MissingEnvVar("ADMIN_IDS".into()));
    }
    Ok(ids)
}
