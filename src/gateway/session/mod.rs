use futures::{SinkExt, StreamExt};
use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    common::types::{AnyResult, UserId, map_boxed_err},
    gateway::{
        constants::{GATEWAY_VERSION, RECONNECT_DELAY_FRESH_MS, WRITE_TASK_SHUTDOWN_MS},
        events::GatewayEvent,
    },
};

pub mod backoff;
pub mod handler;
pub mod heartbeat;
pub mod types;

use self::{
    backoff::Backoff,
    types::{SessionOutcome, classify_close},
};

/// What survives a dropped connection so the next one can resume.
#[derive(Debug, Default, Clone)]
pub struct ResumeState {
    pub session_id: Option<String>,
    pub resume_url: Option<String>,
    /// Set by READY/RESUMED; the run loop consumes it to reset the backoff.
    pub established: bool,
}

impl ResumeState {
    pub fn clear(&mut self) {
        self.session_id = None;
        self.resume_url = None;
    }

    fn can_resume(&self) -> bool {
        self.session_id.is_some()
    }
}

/// A Discord gateway connection that keeps itself alive: it reconnects with
/// backoff, resumes when Discord allows it and identifies fresh otherwise.
/// Decoded dispatches are delivered over `event_tx`.
pub struct GatewaySession {
    token: String,
    gateway_url: String,
    tracked: Vec<UserId>,
    event_tx: UnboundedSender<GatewayEvent>,
    cancel_token: CancellationToken,
}

impl Drop for GatewaySession {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl GatewaySession {
    pub fn new(
        token: String,
        gateway_url: String,
        tracked: Vec<UserId>,
        event_tx: UnboundedSender<GatewayEvent>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            token,
            gateway_url,
            tracked,
            event_tx,
            cancel_token,
        }
    }

    /// Runs until cancelled, until a fatal close, or until reconnects are
    /// exhausted. Fatal closes and exhaustion are returned as errors.
    pub async fn run(self) -> AnyResult<()> {
        let mut backoff = Backoff::new();
        let mut resume = ResumeState::default();
        let mut is_resume = false;
        let seq = Arc::new(AtomicI64::new(-1));

        loop {
            if self.cancel_token.is_cancelled() {
                return Ok(());
            }

            let outcome = self.connect(&mut resume, is_resume, seq.clone()).await;
            if std::mem::take(&mut resume.established) {
                backoff.reset();
            }

            match outcome {
                Ok(SessionOutcome::Shutdown) => {
                    if self.cancel_token.is_cancelled() || self.event_tx.is_closed() {
                        debug!("Gateway shutting down cleanly");
                        return Ok(());
                    }
                    return Err("gateway closed with a fatal code".into());
                }
                Ok(SessionOutcome::Reconnect) => {
                    if backoff.is_exhausted() {
                        return Err("max gateway reconnect attempts reached".into());
                    }
                    let delay = backoff.next();
                    is_resume = resume.can_resume();
                    debug!("Reconnecting in {:?} (resume={})", delay, is_resume);
                    self.sleep(delay).await;
                }
                Ok(SessionOutcome::Identify) => {
                    if backoff.is_exhausted() {
                        return Err("max gateway re-identify attempts reached".into());
                    }
                    is_resume = false;
                    resume.clear();
                    seq.store(-1, Ordering::Relaxed);
                    let delay = std::time::Duration::from_millis(RECONNECT_DELAY_FRESH_MS);
                    debug!("Session invalid; identifying fresh in {:?}", delay);
                    self.sleep(delay).await;
                    backoff.next();
                }
                Err(e) => {
                    if backoff.is_exhausted() {
                        error!("Gateway connection error after max attempts: {}", e);
                        return Err(e);
                    }
                    let delay = backoff.next();
                    warn!("Gateway connection error: {}. Retrying in {:?}", e, delay);
                    self.sleep(delay).await;
                    is_resume = resume.can_resume();
                }
            }
        }
    }

    async fn sleep(&self, delay: std::time::Duration) {
        tokio::select! {
            _ = self.cancel_token.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    fn url(&self, resume: &ResumeState, is_resume: bool) -> String {
        let base = match (&resume.resume_url, is_resume) {
            (Some(url), true) => url.as_str(),
            _ => self.gateway_url.as_str(),
        };
        format!(
            "{}/?v={}&encoding=json",
            base.trim_end_matches('/'),
            GATEWAY_VERSION
        )
    }

    async fn connect(
        &self,
        resume: &mut ResumeState,
        is_resume: bool,
        seq: Arc<AtomicI64>,
    ) -> AnyResult<SessionOutcome> {
        let url = self.url(resume, is_resume);
        debug!("Connecting to gateway: {}", url);

        let (ws_stream, _) = tokio::select! {
            _ = self.cancel_token.cancelled() => return Ok(SessionOutcome::Shutdown),
            res = tokio_tungstenite::connect_async(&url) => res.map_err(map_boxed_err)?,
        };
        let (mut write, mut read) = ws_stream.split();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

        // Cancelled when this connection ends; the parent token means the
        // whole gateway is stopping and the session should be closed cleanly.
        let connection = self.cancel_token.child_token();
        let shutdown = self.cancel_token.clone();
        let conn = connection.clone();
        let write_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    _ = conn.cancelled() => break,
                    msg = rx.recv() => {
                        let Some(msg) = msg else { break };
                        let closing = matches!(msg, Message::Close(_));
                        if let Err(e) = write.send(msg).await {
                            warn!("Gateway WS write error: {}", e);
                            break;
                        }
                        if closing {
                            break;
                        }
                    }
                }
            }
        });

        let mut state = handler::SessionState::new(self, resume, tx.clone(), seq, is_resume);

        let outcome = loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    break SessionOutcome::Shutdown;
                }
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            warn!("Gateway WS read error: {}", e);
                            break SessionOutcome::Reconnect;
                        }
                        None => {
                            debug!("Gateway WS stream ended");
                            break SessionOutcome::Reconnect;
                        }
                    };

                    match msg {
                        Message::Text(text) => {
                            if let Some(outcome) = state.handle_text(text.as_str()) {
                                break outcome;
                            }
                        }
                        Message::Close(frame) => {
                            let (code, reason) = frame
                                .map(|cf| (cf.code.into(), cf.reason.to_string()))
                                .unwrap_or((1000u16, "No reason".into()));

                            let outcome = classify_close(code);
                            if outcome == SessionOutcome::Shutdown {
                                error!("Gateway closed with fatal code {}: '{}'", code, reason);
                            } else {
                                info!("Gateway WS closed: code={}, reason='{}'", code, reason);
                            }
                            break outcome;
                        }
                        _ => {}
                    }
                }
            }
        };

        drop(state);
        connection.cancel();
        drop(tx);
        let _ = tokio::time::timeout(
            std::time::Duration::from_millis(WRITE_TASK_SHUTDOWN_MS),
            write_task,
        )
        .await;

        Ok(outcome)
    }
}
