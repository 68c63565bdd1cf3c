//! Typed views of the gateway dispatches the bot consumes.
//!
//! Decoding is lenient: fields the bot does not use are ignored, and a
//! dispatch missing an identifier it needs is dropped (`None`) rather than
//! failing the connection.

use serde_json::Value;

use crate::{
    common::types::{ChannelId, GuildId, UserId},
    gateway::constants::NON_GAME_ACTIVITY_TYPES,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub kind: u8,
}

/// A user's current activity names, in the order Discord reports them,
/// excluding streaming and custom-status entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub user_id: UserId,
    pub activities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author_id: UserId,
    pub author_bot: bool,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Ready {
        user_id: UserId,
        session_id: String,
    },
    GuildCreate {
        guild_id: GuildId,
        name: String,
        channels: Vec<ChannelInfo>,
        presences: Vec<Presence>,
    },
    /// CHANNEL_CREATE and CHANNEL_UPDATE, for channels created or renamed
    /// after the guild arrived.
    ChannelUpsert {
        guild_id: GuildId,
        channel: ChannelInfo,
    },
    PresenceUpdate {
        guild_id: Option<GuildId>,
        presence: Presence,
    },
    MembersChunk {
        guild_id: GuildId,
        members: Vec<UserId>,
        presences: Vec<Presence>,
        not_found: Vec<UserId>,
        chunk_index: u32,
        chunk_count: u32,
    },
    MessageCreate(IncomingMessage),
}

impl GatewayEvent {
    pub fn from_dispatch(kind: &str, d: &Value) -> Option<Self> {
        match kind {
            "READY" => Some(Self::Ready {
                user_id: UserId::from_json(&d["user"]["id"])?,
                session_id: d["session_id"].as_str()?.to_string(),
            }),
            "GUILD_CREATE" => {
                if d["unavailable"].as_bool() == Some(true) {
                    return None;
                }
                Some(Self::GuildCreate {
                    guild_id: GuildId::from_json(&d["id"])?,
                    name: d["name"].as_str().unwrap_or_default().to_string(),
                    channels: list(&d["channels"], parse_channel),
                    presences: list(&d["presences"], parse_presence),
                })
            }
            "CHANNEL_CREATE" | "CHANNEL_UPDATE" => Some(Self::ChannelUpsert {
                guild_id: GuildId::from_json(&d["guild_id"])?,
                channel: parse_channel(d)?,
            }),
            "PRESENCE_UPDATE" => Some(Self::PresenceUpdate {
                guild_id: GuildId::from_json(&d["guild_id"]),
                presence: parse_presence(d)?,
            }),
            "GUILD_MEMBERS_CHUNK" => Some(Self::MembersChunk {
                guild_id: GuildId::from_json(&d["guild_id"])?,
                members: list(&d["members"], |m| UserId::from_json(&m["user"]["id"])),
                presences: list(&d["presences"], parse_presence),
                not_found: list(&d["not_found"], UserId::from_json),
                chunk_index: d["chunk_index"].as_u64().unwrap_or(0) as u32,
                chunk_count: d["chunk_count"].as_u64().unwrap_or(1) as u32,
            }),
            "MESSAGE_CREATE" => Some(Self::MessageCreate(IncomingMessage {
                channel_id: ChannelId::from_json(&d["channel_id"])?,
                guild_id: GuildId::from_json(&d["guild_id"]),
                author_id: UserId::from_json(&d["author"]["id"])?,
                author_bot: d["author"]["bot"].as_bool().unwrap_or(false),
                content: d["content"].as_str().unwrap_or_default().to_string(),
            })),
            _ => None,
        }
    }
}

fn list<T>(v: &Value, parse: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    v.as_array()
        .map(|items| items.iter().filter_map(parse).collect())
        .unwrap_or_default()
}

fn parse_channel(v: &Value) -> Option<ChannelInfo> {
    Some(ChannelInfo {
        id: ChannelId::from_json(&v["id"])?,
        name: v["name"].as_str().unwrap_or_default().to_string(),
        kind: v["type"].as_u64().unwrap_or(u64::MAX).min(u8::MAX as u64) as u8,
    })
}

fn parse_presence(v: &Value) -> Option<Presence> {
    Some(Presence {
        user_id: UserId::from_json(&v["user"]["id"])?,
        activities: game_activities(&v["activities"]),
    })
}

/// Names of the game-like activities in a presence `activities` array.
pub fn game_activities(v: &Value) -> Vec<String> {
    list(v, |a| {
        let kind = a["type"].as_u64().unwrap_or(0);
        if NON_GAME_ACTIVITY_TYPES.contains(&kind) {
            return None;
        }
        a["name"].as_str().map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn presence_skips_streaming_and_custom_status() {
        let d = json!({
            "user": {"id": "369975308767461378"},
            "guild_id": "1",
            "status": "online",
            "activities": [
                {"name": "Custom Status", "type": 4, "state": "busy"},
                {"name": "Twitch", "type": 1},
                {"name": "Hollow Knight: Silksong", "type": 0},
                {"name": "Spotify", "type": 2}
            ]
        });
        let event = GatewayEvent::from_dispatch("PRESENCE_UPDATE", &d).unwrap();
        assert_eq!(
            event,
            GatewayEvent::PresenceUpdate {
                guild_id: Some(GuildId(1)),
                presence: Presence {
                    user_id: UserId(369975308767461378),
                    activities: vec!["Hollow Knight: Silksong".into(), "Spotify".into()],
                },
            }
        );
    }

    #[test]
    fn guild_create_carries_channels_and_presences() {
        let d = json!({
            "id": "10",
            "name": "home",
            "channels": [
                {"id": "20", "name": "general", "type": 0},
                {"id": "21", "name": "Voice", "type": 2},
                {"name": "broken"}
            ],
            "presences": [
                {"user": {"id": "7"}, "activities": [{"name": "Celeste", "type": 0}]}
            ]
        });
        let GatewayEvent::GuildCreate { guild_id, channels, presences, .. } =
            GatewayEvent::from_dispatch("GUILD_CREATE", &d).unwrap()
        else {
            panic!("expected guild create");
        };
        assert_eq!(guild_id, GuildId(10));
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name, "general");
        assert_eq!(channels[1].kind, 2);
        assert_eq!(presences[0].activities, vec!["Celeste".to_string()]);
    }

    #[test]
    fn unavailable_guild_is_ignored() {
        let d = json!({"id": "10", "unavailable": true});
        assert!(GatewayEvent::from_dispatch("GUILD_CREATE", &d).is_none());
    }

    #[test]
    fn members_chunk_lists_members_and_misses() {
        let d = json!({
            "guild_id": "10",
            "members": [{"user": {"id": "7"}}],
            "presences": [],
            "not_found": ["8"],
            "chunk_index": 0,
            "chunk_count": 1
        });
        let event = GatewayEvent::from_dispatch("GUILD_MEMBERS_CHUNK", &d).unwrap();
        assert_eq!(
            event,
            GatewayEvent::MembersChunk {
                guild_id: GuildId(10),
                members: vec![UserId(7)],
                presences: vec![],
                not_found: vec![UserId(8)],
                chunk_index: 0,
                chunk_count: 1,
            }
        );
    }

    #[test]
    fn message_create_flags_bots() {
        let d = json!({
            "channel_id": "20",
            "guild_id": "10",
            "author": {"id": "99", "bot": true},
            "content": "!totals"
        });
        let GatewayEvent::MessageCreate(msg) = GatewayEvent::from_dispatch("MESSAGE_CREATE", &d).unwrap()
        else {
            panic!("expected message");
        };
        assert!(msg.author_bot);
        assert_eq!(msg.channel_id, ChannelId(20));
        assert_eq!(msg.content, "!totals");
    }

    #[test]
    fn unknown_or_incomplete_dispatches_are_dropped() {
        assert!(GatewayEvent::from_dispatch("TYPING_START", &json!({})).is_none());
        assert!(GatewayEvent::from_dispatch("MESSAGE_CREATE", &json!({"content": "x"})).is_none());
    }
}
