use serde::{Deserialize, Serialize};

pub const TOKEN_ENV_VARS: [&str; 2] = ["DISCORD_TOKEN", "TOKEN"];

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DiscordConfig {
    /// Bot token. May be left empty and supplied through `DISCORD_TOKEN` or `TOKEN`.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            gateway_url: default_gateway_url(),
            api_url: default_api_url(),
        }
    }
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg".to_string()
}

fn default_api_url() -> String {
    "https://discord.com/api/v10".to_string()
}
