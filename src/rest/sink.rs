use async_trait::async_trait;

use crate::{
    common::types::{AnyResult, ChannelId},
    rest::DiscordRest,
    tracker::notifier::{MESSAGE_LIMIT, MessageSink, split_message},
};

/// Posts to one text channel, splitting text that exceeds Discord's limit.
pub struct ChannelSink<'a> {
    rest: &'a DiscordRest,
    channel_id: ChannelId,
}

impl<'a> ChannelSink<'a> {
    pub fn new(rest: &'a DiscordRest, channel_id: ChannelId) -> Self {
        Self { rest, channel_id }
    }
}

#[async_trait]
impl MessageSink for ChannelSink<'_> {
    async fn send(&self, content: &str) -> AnyResult<()> {
        for chunk in split_message(content, MESSAGE_LIMIT) {
            self.rest.create_message(self.channel_id, &chunk).await?;
        }
        Ok(())
    }
}
