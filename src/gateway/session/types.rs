use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One gateway frame. `s` and `t` are only present on dispatches (op 0).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayPayload {
    pub fn new(op: u8, d: Value) -> Self {
        Self { op, d, s: None, t: None }
    }
}

pub mod op {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RESUME: u8 = 6;
    pub const RECONNECT: u8 = 7;
    pub const REQUEST_GUILD_MEMBERS: u8 = 8;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Outcome of a single WS session; tells the outer loop what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Reconnectable disconnect, try an Op 6 resume.
    Reconnect,
    /// Session invalid, start over with a fresh Op 2 Identify.
    Identify,
    /// Fatal close or local shutdown, stop entirely.
    Shutdown,
}

/// Close codes after which the session cannot be resumed but a new one can
/// be identified: invalid seq and session timeout.
pub fn is_reidentify_close(code: u16) -> bool {
    matches!(code, 4007 | 4009)
}

/// Close codes that mean retrying is pointless.
///
/// - `4004`: Authentication failed
/// - `4010`/`4011`: Invalid or required sharding
/// - `4012`: Invalid API version
/// - `4013`/`4014`: Invalid or disallowed intents
pub fn is_fatal_close(code: u16) -> bool {
    matches!(code, 4004 | 4010..=4014)
}

/// Maps a close code to the next step. Anything not fatal or re-identify
/// (including 1000/1001 from the server and the 4000-range transients) resumes.
pub fn classify_close(code: u16) -> SessionOutcome {
    if is_fatal_close(code) {
        SessionOutcome::Shutdown
    } else if is_reidentify_close(code) {
        SessionOutcome::Identify
    } else {
        SessionOutcome::Reconnect
    }
}
