pub mod client;
pub mod sink;

pub use client::{DiscordRest, GuildMember};
pub use sink::ChannelSink;
