use std::{future::Future, time::Duration};

use tokio::{
    sync::mpsc::UnboundedReceiver,
    time::{Instant, MissedTickBehavior},
};
use tracing::{info, warn};

use crate::{bot::context::BotContext, configs::TrackerConfig, gateway::GatewayEvent};

/// How long to wait for the tracked user's member chunk once the channel is
/// known before reconciling with whatever is available.
pub const STARTUP_MEMBERS_WAIT: Duration = Duration::from_secs(10);

/// How often to remind the log that the channel has not shown up yet.
const CHANNEL_WAIT_WARNING: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub poll: Duration,
    pub live: Duration,
}

impl From<&TrackerConfig> for Cadence {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            poll: Duration::from_secs(config.poll_interval_secs),
            live: Duration::from_secs(config.live_refresh_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// SIGINT/SIGTERM or the caller's shutdown future resolved.
    Signal,
    /// The gateway task ended and no more events will arrive.
    GatewayClosed,
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// The bot's event loop. Waits for the announcement channel and the tracked
/// user's presence, reconciles once, then serves events and both timers until
/// `shutdown` resolves or the gateway goes away. Always flushes before returning.
pub async fn run<F>(
    ctx: &mut BotContext,
    events: &mut UnboundedReceiver<GatewayEvent>,
    cadence: Cadence,
    shutdown: F,
) -> ExitReason
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    if let Some(reason) = wait_for_startup(ctx, events, &mut shutdown).await {
        ctx.shutdown();
        return reason;
    }

    if let Some(outcome) = ctx.reconcile().await {
        info!("Startup reconciliation: {:?}", outcome);
    }

    let mut poll = tokio::time::interval(cadence.poll);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut live = tokio::time::interval(cadence.live);
    live.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Tracking started (poll every {:?}, live refresh every {:?})",
        cadence.poll, cadence.live
    );

    let reason = loop {
        tokio::select! {
            _ = &mut shutdown => break ExitReason::Signal,
            event = events.recv() => match event {
                Some(event) => ctx.handle_event(event).await,
                None => break ExitReason::GatewayClosed,
            },
            _ = poll.tick() => ctx.poll().await,
            _ = live.tick() => ctx.refresh_live(),
        }
    };

    info!("Stopping: {:?}", reason);
    ctx.shutdown();
    reason
}

/// Feeds events into the context until the channel is located and the
/// member chunk arrived (or `STARTUP_MEMBERS_WAIT` passed after the channel).
async fn wait_for_startup<F>(
    ctx: &mut BotContext,
    events: &mut UnboundedReceiver<GatewayEvent>,
    shutdown: &mut F,
) -> Option<ExitReason>
where
    F: Future<Output = ()> + Unpin,
{
    let mut members_deadline: Option<Instant> = None;
    let mut next_warning = Instant::now() + CHANNEL_WAIT_WARNING;

    loop {
        if ctx.channel().is_some() {
            if ctx.members_loaded() {
                return None;
            }
            let deadline = *members_deadline.get_or_insert_with(|| Instant::now() + STARTUP_MEMBERS_WAIT);
            if Instant::now() >= deadline {
                warn!("Member chunk did not arrive in {:?}; continuing", STARTUP_MEMBERS_WAIT);
                return None;
            }
        }

        let wake = members_deadline.unwrap_or(next_warning);
        tokio::select! {
            _ = &mut *shutdown => return Some(ExitReason::Signal),
            event = events.recv() => match event {
                Some(event) => ctx.handle_event(event).await,
                None => return Some(ExitReason::GatewayClosed),
            },
            _ = tokio::time::sleep_until(wake) => {
                if members_deadline.is_none() {
                    warn!("Still waiting for a guild with a #{} text channel", ctx.channel_name());
                    next_warning = Instant::now() + CHANNEL_WAIT_WARNING;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::types::{ChannelId, GuildId, UserId},
        configs::{Config, DiscordConfig},
        gateway::{Presence, events::ChannelInfo},
        rest::DiscordRest,
        tracker::{LedgerStore, TrackerService, matcher::TitleMatcher},
    };
    use axum::{Json, Router, extract::State, routing::post};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio::sync::{mpsc::unbounded_channel, oneshot};

    const USER: UserId = UserId(7);

    type Posted = Arc<Mutex<Vec<String>>>;

    async fn record(State(posted): State<Posted>, Json(body): Json<Value>) -> Json<Value> {
        posted
            .lock()
            .unwrap()
            .push(body["content"].as_str().unwrap_or_default().to_string());
        Json(json!({"id": "1"}))
    }

    /// Stands in for the Discord REST API and records posted messages.
    async fn fake_discord() -> (String, Posted) {
        let posted = Posted::default();
        let app = Router::new()
            .route("/channels/{id}/messages", post(record))
            .with_state(posted.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), posted)
    }

    fn context(dir: &TempDir, api_url: String) -> BotContext {
        let config = Config::from_toml(
            r#"
            [discord]
            token = "secret"

            [tracker]
            user_id = 7
            display_name = "Gabo"
            channel_name = "general"
            games = ["Celeste"]
            "#,
        )
        .unwrap();
        let tracker = TrackerService::from_parts(
            USER,
            "Gabo".into(),
            LedgerStore::load(dir.path().join("playtime.json")),
            TitleMatcher::new(["Celeste"]),
        );
        let rest = DiscordRest::new(&DiscordConfig {
            token: "secret".into(),
            api_url,
            ..Default::default()
        })
        .unwrap();
        BotContext::new(&config, tracker, rest)
    }

    fn presence(activities: &[&str]) -> Presence {
        Presence {
            user_id: USER,
            activities: activities.iter().map(|a| a.to_string()).collect(),
        }
    }

    async fn wait_for(posted: &Posted, count: usize) {
        for _ in 0..200 {
            if posted.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} messages, got {:?}", count, posted.lock().unwrap());
    }

    #[tokio::test]
    async fn tracks_a_session_end_to_end() {
        let dir = TempDir::new().unwrap();
        let (api_url, posted) = fake_discord().await;
        let mut ctx = context(&dir, api_url);
        let (tx, mut rx) = unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        tx.send(GatewayEvent::GuildCreate {
            guild_id: GuildId(10),
            name: "home".into(),
            channels: vec![ChannelInfo { id: ChannelId(20), name: "general".into(), kind: 0 }],
            presences: vec![presence(&["Celeste"])],
        })
        .unwrap();
        tx.send(GatewayEvent::MembersChunk {
            guild_id: GuildId(10),
            members: vec![USER],
            presences: vec![presence(&["Celeste"])],
            not_found: vec![],
            chunk_index: 0,
            chunk_count: 1,
        })
        .unwrap();

        let cadence = Cadence {
            poll: Duration::from_millis(20),
            live: Duration::from_millis(40),
        };
        let driver = async {
            wait_for(&posted, 1).await;
            tx.send(GatewayEvent::PresenceUpdate {
                guild_id: Some(GuildId(10)),
                presence: presence(&[]),
            })
            .unwrap();
            wait_for(&posted, 2).await;
            stop_tx.send(()).unwrap();
        };
        let shutdown = async {
            let _ = stop_rx.await;
        };

        let (reason, _) = tokio::join!(run(&mut ctx, &mut rx, cadence, shutdown), driver);
        assert_eq!(reason, ExitReason::Signal);

        let posted = posted.lock().unwrap().clone();
        assert!(posted[0].contains("started playing **Celeste**"));
        assert!(posted[1].contains("stopped playing **Celeste**"));

        let store = LedgerStore::load(dir.path().join("playtime.json"));
        assert!(store.ledger().games.contains_key("Celeste"));
        assert!(store.ledger().active_sessions.is_empty());
    }

    #[tokio::test]
    async fn closed_gateway_during_startup_still_flushes() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, "http://127.0.0.1:9".into());
        let (tx, mut rx) = unbounded_channel::<GatewayEvent>();
        drop(tx);

        let cadence = Cadence {
            poll: Duration::from_secs(15),
            live: Duration::from_secs(60),
        };
        let reason = run(&mut ctx, &mut rx, cadence, std::future::pending::<()>()).await;
        assert_eq!(reason, ExitReason::GatewayClosed);
        assert!(dir.path().join("playtime.json").exists());
    }

    #[test]
    fn cadence_follows_config() {
        let config = Config::from_toml(
            r#"
            [tracker]
            user_id = 7
            channel_name = "general"
            games = ["Celeste"]
            poll_interval_secs = 10
            live_refresh_secs = 30
            "#,
        )
        .unwrap();
        let cadence = Cadence::from(&config.tracker);
        assert_eq!(cadence.poll, Duration::from_secs(10));
        assert_eq!(cadence.live, Duration::from_secs(30));
    }
}
