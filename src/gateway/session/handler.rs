use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI64, Ordering},
};

use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use super::{
    GatewaySession, ResumeState,
    heartbeat::{heartbeat_message, spawn_heartbeat},
};
use crate::{
    common::types::GuildId,
    gateway::{
        constants::{DEFAULT_HEARTBEAT_MS, INTENTS},
        events::GatewayEvent,
        session::types::{GatewayPayload, SessionOutcome, op},
    },
};

/// Per-connection protocol state. Lives for one WebSocket connection; the
/// resume details it learns outlive it through `ResumeState`.
pub struct SessionState<'a> {
    gateway: &'a GatewaySession,
    resume: &'a mut ResumeState,
    tx: tokio::sync::mpsc::UnboundedSender<Message>,
    seq: Arc<AtomicI64>,
    acked: Arc<AtomicBool>,
    is_resume: bool,
    heartbeat_handle: Option<tokio::task::JoinHandle<()>>,
}

impl<'a> SessionState<'a> {
    pub fn new(
        gateway: &'a GatewaySession,
        resume: &'a mut ResumeState,
        tx: tokio::sync::mpsc::UnboundedSender<Message>,
        seq: Arc<AtomicI64>,
        is_resume: bool,
    ) -> Self {
        Self {
            gateway,
            resume,
            tx,
            seq,
            acked: Arc::new(AtomicBool::new(true)),
            is_resume,
            heartbeat_handle: None,
        }
    }

    pub fn handle_text(&mut self, text: &str) -> Option<SessionOutcome> {
        let msg: GatewayPayload = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to parse gateway message: {} - Text: {}", e, text);
                return None;
            }
        };

        if let Some(seq) = msg.s {
            self.seq.store(seq, Ordering::Relaxed);
        }

        match msg.op {
            op::HELLO => self.handle_hello(msg.d),
            op::DISPATCH => self.handle_dispatch(msg.t, msg.d),
            op::HEARTBEAT_ACK => {
                self.acked.store(true, Ordering::Relaxed);
                None
            }
            op::HEARTBEAT => {
                if let Some(hb) = heartbeat_message(self.seq.load(Ordering::Relaxed)) {
                    let _ = self.tx.send(hb);
                }
                None
            }
            op::RECONNECT => {
                info!("Gateway requested a reconnect");
                Some(SessionOutcome::Reconnect)
            }
            op::INVALID_SESSION => self.handle_invalid_session(msg.d),
            _ => {
                debug!("Received gateway op {}: {:?}", msg.op, msg.d);
                None
            }
        }
    }

    fn handle_hello(&mut self, d: Value) -> Option<SessionOutcome> {
        let interval = d["heartbeat_interval"]
            .as_u64()
            .unwrap_or(DEFAULT_HEARTBEAT_MS);
        if let Some(h) = self.heartbeat_handle.take() {
            h.abort();
        }

        debug!("Heartbeat interval set to {}ms", interval);
        self.heartbeat_handle = Some(spawn_heartbeat(
            self.tx.clone(),
            self.seq.clone(),
            self.acked.clone(),
            interval,
        ));

        match (&self.resume.session_id, self.is_resume) {
            (Some(session_id), true) => {
                let seq = self.seq.load(Ordering::Relaxed);
                debug!("Resuming session {} at seq {}", session_id, seq);
                self.send_json(
                    op::RESUME,
                    json!({
                        "token": self.gateway.token,
                        "session_id": session_id,
                        "seq": seq,
                    }),
                );
            }
            _ => {
                debug!("Identifying with intents {}", INTENTS);
                self.send_json(op::IDENTIFY, self.identify_payload());
            }
        }
        None
    }

    fn identify_payload(&self) -> Value {
        json!({
            "token": self.gateway.token,
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": env!("CARGO_PKG_NAME"),
                "device": env!("CARGO_PKG_NAME"),
            },
        })
    }

    fn handle_invalid_session(&mut self, d: Value) -> Option<SessionOutcome> {
        if d.as_bool() == Some(true) {
            info!("Gateway session invalidated but resumable");
            return Some(SessionOutcome::Reconnect);
        }
        warn!("Gateway session invalidated; identifying fresh");
        self.resume.clear();
        Some(SessionOutcome::Identify)
    }

    fn handle_dispatch(&mut self, kind: Option<String>, d: Value) -> Option<SessionOutcome> {
        let kind = kind?;
        match kind.as_str() {
            "READY" => {
                self.resume.session_id = d["session_id"].as_str().map(str::to_string);
                self.resume.resume_url = d["resume_gateway_url"].as_str().map(str::to_string);
                self.resume.established = true;
                info!(
                    "Gateway ready as {} ({} guilds)",
                    d["user"]["username"].as_str().unwrap_or("unknown"),
                    d["guilds"].as_array().map(Vec::len).unwrap_or(0)
                );
            }
            "RESUMED" => {
                self.resume.established = true;
                info!("Gateway session resumed");
            }
            "GUILD_CREATE" => {
                if let Some(guild_id) = GuildId::from_json(&d["id"]) {
                    self.request_members(guild_id);
                }
            }
            _ => {}
        }

        let event = GatewayEvent::from_dispatch(&kind, &d)?;
        if self.gateway.event_tx.send(event).is_err() {
            debug!("Event receiver dropped; stopping gateway");
            return Some(SessionOutcome::Shutdown);
        }
        None
    }

    /// Op 8 for the tracked users, with presences, so their current activity
    /// is known without waiting for the next PRESENCE_UPDATE.
    fn request_members(&self, guild_id: GuildId) {
        if self.gateway.tracked.is_empty() {
            return;
        }
        let user_ids: Vec<String> = self.gateway.tracked.iter().map(|u| u.to_string()).collect();
        debug!("Requesting members {:?} of guild {}", user_ids, guild_id);
        self.send_json(
            op::REQUEST_GUILD_MEMBERS,
            json!({
                "guild_id": guild_id.to_string(),
                "user_ids": user_ids,
                "presences": true,
            }),
        );
    }

    fn send_json(&self, op: u8, d: Value) {
        let msg = GatewayPayload::new(op, d);
        if let Ok(json) = serde_json::to_string(&msg) {
            let _ = self.tx.send(Message::Text(json.into()));
        }
    }
}

impl<'a> Drop for SessionState<'a> {
    fn drop(&mut self) {
        if let Some(h) = self.heartbeat_handle.take() {
            h.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::UserId;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
    use tokio_util::sync::CancellationToken;

    fn gateway() -> (GatewaySession, UnboundedReceiver<GatewayEvent>) {
        let (event_tx, event_rx) = unbounded_channel();
        let session = GatewaySession::new(
            "secret".into(),
            "wss://gateway.discord.gg".into(),
            vec![UserId(7)],
            event_tx,
            CancellationToken::new(),
        );
        (session, event_rx)
    }

    fn sent(rx: &mut UnboundedReceiver<Message>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(t) = msg {
                out.push(serde_json::from_str(t.as_str()).unwrap());
            }
        }
        out
    }

    #[tokio::test]
    async fn hello_identifies_with_intents() {
        let (gw, _events) = gateway();
        let mut resume = ResumeState::default();
        let (tx, mut rx) = unbounded_channel();
        let mut state = SessionState::new(&gw, &mut resume, tx, Arc::new(AtomicI64::new(-1)), false);

        let out = state.handle_text(r#"{"op":10,"d":{"heartbeat_interval":45000}}"#);
        assert!(out.is_none());

        let frames = sent(&mut rx);
        assert_eq!(frames[0]["op"], 2);
        assert_eq!(frames[0]["d"]["token"], "secret");
        assert_eq!(frames[0]["d"]["intents"], INTENTS);
    }

    #[tokio::test]
    async fn hello_resumes_when_a_session_is_known() {
        let (gw, _events) = gateway();
        let mut resume = ResumeState {
            session_id: Some("abc".into()),
            resume_url: Some("wss://resume.discord.gg".into()),
            established: false,
        };
        let (tx, mut rx) = unbounded_channel();
        let mut state = SessionState::new(&gw, &mut resume, tx, Arc::new(AtomicI64::new(41)), true);

        state.handle_text(r#"{"op":10,"d":{"heartbeat_interval":45000}}"#);
        let frames = sent(&mut rx);
        assert_eq!(frames[0]["op"], 6);
        assert_eq!(frames[0]["d"]["session_id"], "abc");
        assert_eq!(frames[0]["d"]["seq"], 41);
    }

    #[test]
    fn ready_records_resume_details_and_forwards_event() {
        let (gw, mut events) = gateway();
        let mut resume = ResumeState::default();
        let (tx, _rx) = unbounded_channel();
        let seq = Arc::new(AtomicI64::new(-1));
        let mut state = SessionState::new(&gw, &mut resume, tx, seq.clone(), false);

        let ready = r#"{"op":0,"s":1,"t":"READY","d":{
            "session_id":"abc",
            "resume_gateway_url":"wss://resume.discord.gg",
            "user":{"id":"99","username":"playwatch"},
            "guilds":[{"id":"10","unavailable":true}]
        }}"#;
        assert!(state.handle_text(ready).is_none());
        drop(state);

        assert_eq!(seq.load(Ordering::Relaxed), 1);
        assert_eq!(resume.session_id.as_deref(), Some("abc"));
        assert_eq!(resume.resume_url.as_deref(), Some("wss://resume.discord.gg"));
        assert!(resume.established);
        assert_eq!(
            events.try_recv().unwrap(),
            GatewayEvent::Ready {
                user_id: UserId(99),
                session_id: "abc".into()
            }
        );
    }

    #[test]
    fn guild_create_requests_tracked_members() {
        let (gw, mut events) = gateway();
        let mut resume = ResumeState::default();
        let (tx, mut rx) = unbounded_channel();
        let mut state = SessionState::new(&gw, &mut resume, tx, Arc::new(AtomicI64::new(-1)), false);

        state.handle_text(r#"{"op":0,"s":2,"t":"GUILD_CREATE","d":{"id":"10","name":"home","channels":[]}}"#);
        let frames = sent(&mut rx);
        assert_eq!(frames[0]["op"], 8);
        assert_eq!(frames[0]["d"]["guild_id"], "10");
        assert_eq!(frames[0]["d"]["user_ids"], json!(["7"]));
        assert_eq!(frames[0]["d"]["presences"], true);
        assert!(matches!(events.try_recv(), Ok(GatewayEvent::GuildCreate { .. })));
    }

    #[test]
    fn reconnect_and_invalid_session_choose_the_next_step() {
        let (gw, _events) = gateway();
        let mut resume = ResumeState {
            session_id: Some("abc".into()),
            resume_url: None,
            established: false,
        };
        let (tx, _rx) = unbounded_channel();
        let mut state = SessionState::new(&gw, &mut resume, tx, Arc::new(AtomicI64::new(5)), true);

        assert_eq!(state.handle_text(r#"{"op":7,"d":null}"#), Some(SessionOutcome::Reconnect));
        assert_eq!(state.handle_text(r#"{"op":9,"d":true}"#), Some(SessionOutcome::Reconnect));
        assert_eq!(state.handle_text(r#"{"op":9,"d":false}"#), Some(SessionOutcome::Identify));
        drop(state);
        assert!(resume.session_id.is_none());
    }

    #[test]
    fn heartbeat_request_is_answered_immediately() {
        let (gw, _events) = gateway();
        let mut resume = ResumeState::default();
        let (tx, mut rx) = unbounded_channel();
        let mut state = SessionState::new(&gw, &mut resume, tx, Arc::new(AtomicI64::new(9)), false);

        state.handle_text(r#"{"op":1,"d":null}"#);
        assert_eq!(sent(&mut rx), vec![json!({"op": 1, "d": 9})]);
    }

    #[test]
    fn dropped_receiver_shuts_the_session_down() {
        let (gw, events) = gateway();
        drop(events);
        let mut resume = ResumeState::default();
        let (tx, _rx) = unbounded_channel();
        let mut state = SessionState::new(&gw, &mut resume, tx, Arc::new(AtomicI64::new(-1)), false);

        let msg = r#"{"op":0,"s":3,"t":"MESSAGE_CREATE","d":{"channel_id":"20","author":{"id":"1"},"content":"hi"}}"#;
        assert_eq!(state.handle_text(msg), Some(SessionOutcome::Shutdown));
    }
}
