use serde::{Deserialize, Serialize};

use crate::common::types::UserId;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrackerConfig {
    pub user_id: UserId,
    /// Name used in announcements.
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Text channel where announcements go and commands are accepted.
    pub channel_name: String,
    /// Ordered allow-list of title substrings; earlier entries win ties.
    pub games: Vec<String>,
    #[serde(default = "default_data_file")]
    pub data_file: String,
    #[serde(default = "default_lock_file")]
    pub lock_file: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_live_refresh_secs")]
    pub live_refresh_secs: u64,
    /// Fixed UTC offset for stored timestamps; the host's local offset when unset.
    #[serde(default)]
    pub utc_offset_hours: Option<i8>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CommandsConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

fn default_display_name() -> String {
    "Player".to_string()
}

fn default_data_file() -> String {
    "playtime.json".to_string()
}

fn default_lock_file() -> String {
    "playwatch.lock".to_string()
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_live_refresh_secs() -> u64 {
    60
}

fn default_prefix() -> String {
    "!".to_string()
}
