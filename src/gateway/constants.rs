/// Discord Gateway version to use in the WebSocket URL.
pub const GATEWAY_VERSION: u8 = 10;

pub const INTENT_GUILDS: u64 = 1 << 0;
pub const INTENT_GUILD_MEMBERS: u64 = 1 << 1;
pub const INTENT_GUILD_PRESENCES: u64 = 1 << 8;
pub const INTENT_GUILD_MESSAGES: u64 = 1 << 9;
pub const INTENT_MESSAGE_CONTENT: u64 = 1 << 15;

/// Intents sent with Identify. Members and presences are privileged and must
/// be enabled for the application in the developer portal.
pub const INTENTS: u64 = INTENT_GUILDS
    | INTENT_GUILD_MEMBERS
    | INTENT_GUILD_PRESENCES
    | INTENT_GUILD_MESSAGES
    | INTENT_MESSAGE_CONTENT;

/// Maximum consecutive reconnect attempts before giving up on the gateway.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Base delay (ms) for the exponential backoff on reconnect.
pub const BACKOFF_BASE_MS: u64 = 1_000;

/// Fixed delay (ms) before a fresh Identify after an invalid session.
/// Discord asks for a random wait between 1 and 5 seconds.
pub const RECONNECT_DELAY_FRESH_MS: u64 = 2_500;

/// Timeout (ms) allowed for the WS write task to shut down gracefully.
pub const WRITE_TASK_SHUTDOWN_MS: u64 = 500;

/// Used when Hello arrives without an interval.
pub const DEFAULT_HEARTBEAT_MS: u64 = 41_250;

/// Discord channel type for guild text channels.
pub const GUILD_TEXT_CHANNEL: u8 = 0;

/// Activity types that are not games: streaming and custom status.
pub const NON_GAME_ACTIVITY_TYPES: [u64; 2] = [1, 4];
