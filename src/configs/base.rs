use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    common::{errors::StartupError, types::AnyResult},
    configs::*,
};

pub const CONFIG_FILES: [&str; 2] = ["config.toml", "config.default.toml"];

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Loads `config.toml`, falling back to `config.default.toml`, then applies
    /// the token environment override and validates the result.
    pub fn load() -> AnyResult<Self> {
        let Some(config_path) = CONFIG_FILES.iter().find(|p| Path::new(p).exists()) else {
            return Err("config.toml or config.default.toml not found".into());
        };

        crate::log_println!("Loading configuration from: {}", config_path);

        let config_str = std::fs::read_to_string(config_path)?;
        if config_str.trim().is_empty() {
            return Err(format!("{} is empty", config_path).into());
        }

        let mut config = Self::from_toml(&config_str)?;
        let env_token = TOKEN_ENV_VARS
            .iter()
            .find_map(|key| std::env::var(key).ok())
            .filter(|t| !t.trim().is_empty());
        if let Some(token) = env_token {
            config.discord.token = token;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> AnyResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), StartupError> {
        let invalid = |msg: String| Err(StartupError::Config(msg));

        if self.discord.token.trim().is_empty() {
            return invalid(format!(
                "no bot token: set [discord] token or one of {:?}",
                TOKEN_ENV_VARS
            ));
        }
        let tracker = &self.tracker;
        if tracker.channel_name.trim().is_empty() {
            return invalid("[tracker] channel_name must not be empty".into());
        }
        if tracker.games.iter().all(|g| g.trim().is_empty()) {
            return invalid("[tracker] games must list at least one title".into());
        }
        if tracker.poll_interval_secs == 0 {
            return invalid("[tracker] poll_interval_secs must be positive".into());
        }
        if tracker.live_refresh_secs < tracker.poll_interval_secs {
            return invalid(format!(
                "[tracker] live_refresh_secs ({}) must not be shorter than poll_interval_secs ({})",
                tracker.live_refresh_secs, tracker.poll_interval_secs
            ));
        }
        if let Some(h) = tracker.utc_offset_hours {
            if !(-23..=23).contains(&h) {
                return invalid(format!("[tracker] utc_offset_hours {} is out of range", h));
            }
        }
        Ok(())
    }
}
