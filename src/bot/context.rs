use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::{
    bot::commands::{Command, usage},
    common::{
        clock::Clock,
        types::{ChannelId, GuildId, UserId},
    },
    configs::Config,
    gateway::{
        GatewayEvent, IncomingMessage, Presence, constants::GUILD_TEXT_CHANNEL, events::ChannelInfo,
    },
    rest::{ChannelSink, DiscordRest},
    tracker::{MessageSink, TrackerService, reconcile::Reconciliation},
};

/// State owned by the bot's event loop. Nothing here is shared across
/// tasks, so handlers take `&mut self` and never lock.
pub struct BotContext {
    tracker: TrackerService,
    rest: DiscordRest,
    clock: Clock,
    channel_name: String,
    prefix: String,
    /// Latest known activities of the tracked user, fed by gateway events.
    presences: HashMap<UserId, Vec<String>>,
    /// Users Discord reported as not in the guild.
    absent: HashSet<UserId>,
    channel: Option<(GuildId, ChannelId)>,
    members_loaded: bool,
    bot_user: Option<UserId>,
}

impl BotContext {
    pub fn new(config: &Config, tracker: TrackerService, rest: DiscordRest) -> Self {
        Self {
            tracker,
            rest,
            clock: Clock::resolve(config.tracker.utc_offset_hours, None),
            channel_name: config.tracker.channel_name.clone(),
            prefix: config.commands.prefix.clone(),
            presences: HashMap::new(),
            absent: HashSet::new(),
            channel: None,
            members_loaded: false,
            bot_user: None,
        }
    }

    /// Replaces the clock, e.g. with one using the host offset captured
    /// before the runtime started.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn tracker(&self) -> &TrackerService {
        &self.tracker
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel.map(|(_, channel)| channel)
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn members_loaded(&self) -> bool {
        self.members_loaded
    }

    /// Last known activities of the tracked user; `None` until Discord has
    /// told us anything about them.
    pub fn tracked_activities(&self) -> Option<&[String]> {
        self.presences.get(&self.tracker.user()).map(Vec::as_slice)
    }

    pub async fn handle_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready { user_id, .. } => {
                self.bot_user = Some(user_id);
            }
            GatewayEvent::GuildCreate {
                guild_id,
                name,
                channels,
                presences,
            } => {
                debug!("Guild {} ({}) available with {} channels", name, guild_id, channels.len());
                for channel in &channels {
                    self.consider_channel(guild_id, channel);
                }
                for presence in presences {
                    self.update_presence(presence);
                }
            }
            GatewayEvent::ChannelUpsert { guild_id, channel } => {
                self.consider_channel(guild_id, &channel);
            }
            GatewayEvent::PresenceUpdate { presence, .. } => self.update_presence(presence),
            GatewayEvent::MembersChunk {
                members,
                presences,
                not_found,
                chunk_index,
                chunk_count,
                ..
            } => {
                let user = self.tracker.user();
                if members.contains(&user) {
                    // a member without a presence entry is offline
                    let activities = presences
                        .into_iter()
                        .find(|p| p.user_id == user)
                        .map(|p| p.activities)
                        .unwrap_or_default();
                    self.absent.remove(&user);
                    self.presences.insert(user, activities);
                }
                if not_found.contains(&user) {
                    warn!("Tracked user {} is not a member of the guild", user);
                    self.absent.insert(user);
                }
                if chunk_index + 1 >= chunk_count {
                    self.members_loaded = true;
                }
            }
            GatewayEvent::MessageCreate(msg) => {
                if let Some(reply) = self.command_reply(&msg) {
                    self.reply(msg.channel_id, &reply).await;
                }
            }
        }
    }

    fn consider_channel(&mut self, guild_id: GuildId, channel: &ChannelInfo) {
        if self.channel.is_some() || channel.kind != GUILD_TEXT_CHANNEL {
            return;
        }
        if channel.name == self.channel_name {
            info!("Announcing in #{} ({}) of guild {}", channel.name, channel.id, guild_id);
            self.channel = Some((guild_id, channel.id));
        }
    }

    fn update_presence(&mut self, presence: Presence) {
        if presence.user_id != self.tracker.user() {
            return;
        }
        debug!("Presence for {}: {:?}", presence.user_id, presence.activities);
        self.absent.remove(&presence.user_id);
        self.presences.insert(presence.user_id, presence.activities);
    }

    /// The reply to a chat message, when it is a command this bot should answer.
    pub fn command_reply(&self, msg: &IncomingMessage) -> Option<String> {
        if msg.author_bot || Some(msg.author_id) == self.bot_user {
            return None;
        }
        if self.channel() != Some(msg.channel_id) {
            return None;
        }
        let command = Command::parse(&msg.content, &self.prefix)?;
        debug!("Command from {}: {:?}", msg.author_id, command);

        Some(match command {
            Command::Totals => self.tracker.totals_report(),
            Command::Now => self.tracker.in_progress_report(self.clock.now()),
            Command::Game(Some(name)) => self.tracker.game_report(&name),
            Command::Game(None) => usage(&self.prefix),
        })
    }

    async fn reply(&self, channel_id: ChannelId, content: &str) {
        if let Err(e) = ChannelSink::new(&self.rest, channel_id).send(content).await {
            warn!("Failed to reply in {}: {}", channel_id, e);
        }
    }

    /// Poll tick: apply the cached presence to the tracker.
    pub async fn poll(&mut self) {
        let user = self.tracker.user();
        let Some(activities) = self.presences.get(&user).cloned() else {
            warn!("Tracked user {} not resolvable; skipping poll", user);
            return;
        };
        let Some((_, channel_id)) = self.channel else {
            warn!("Announcement channel #{} not found; skipping poll", self.channel_name);
            return;
        };

        let sink = ChannelSink::new(&self.rest, channel_id);
        self.tracker.observe(&activities, self.clock.now(), &sink).await;
    }

    pub fn refresh_live(&mut self) {
        let outcome = self.tracker.refresh_live(self.clock.now());
        if outcome.updated > 0 || outcome.skipped > 0 {
            debug!(
                "Live projection refreshed for {} game(s), {} record(s) skipped",
                outcome.updated, outcome.skipped
            );
        }
    }

    /// Startup reconciliation of a session left open by a previous run.
    /// `None` when it could not run because the channel is still unknown.
    pub async fn reconcile(&mut self) -> Option<Reconciliation> {
        let Some((_, channel_id)) = self.channel else {
            warn!("Skipping reconciliation: announcement channel not found");
            return None;
        };
        let activities = self.startup_presence().await;
        let sink = ChannelSink::new(&self.rest, channel_id);
        let outcome = self
            .tracker
            .reconcile(activities.as_deref(), self.clock.now(), &sink)
            .await;
        Some(outcome)
    }

    /// Best available evidence of what the tracked user is doing. `None`
    /// means it could not be determined; only a definitive "not a member"
    /// counts as not playing when no presence was ever received.
    async fn startup_presence(&self) -> Option<Vec<String>> {
        let user = self.tracker.user();
        if let Some(activities) = self.presences.get(&user) {
            return Some(activities.clone());
        }
        if self.absent.contains(&user) {
            return Some(Vec::new());
        }

        let (guild_id, _) = self.channel?;
        match self.rest.get_member(guild_id, user).await {
            Ok(None) => {
                warn!("Tracked user {} is not a member of guild {}", user, guild_id);
                Some(Vec::new())
            }
            Ok(Some(member)) => {
                info!("Presence of {} unknown at startup", member.display_name());
                None
            }
            Err(e) => {
                warn!("Member lookup for {} failed: {}", user, e);
                None
            }
        }
    }

    /// Shutdown: persist whatever is still only in memory.
    pub fn shutdown(&mut self) -> bool {
        let saved = self.tracker.flush();
        if saved {
            info!("Ledger saved to {}", self.tracker.store().path().display());
        }
        saved
    }
}
