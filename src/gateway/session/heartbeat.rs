use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI64, Ordering},
    },
    time::Duration,
};

use serde_json::Value;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::warn;

use crate::gateway::session::types::{GatewayPayload, op};

/// Builds an op 1 frame carrying the last dispatch sequence (`null` before any).
pub fn heartbeat_message(seq: i64) -> Option<Message> {
    let d = if seq >= 0 { Value::from(seq) } else { Value::Null };
    serde_json::to_string(&GatewayPayload::new(op::HEARTBEAT, d))
        .ok()
        .map(|json| Message::Text(json.into()))
}

/// Sends heartbeats every `interval_ms`, the first one after a random
/// fraction of the interval. If the previous beat was never acknowledged the
/// connection is treated as zombied and closed so the session resumes.
pub fn spawn_heartbeat(
    tx_hb: tokio::sync::mpsc::UnboundedSender<Message>,
    seq: Arc<AtomicI64>,
    acked: Arc<AtomicBool>,
    interval_ms: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let jitter = Duration::from_millis((interval_ms as f64 * rand::random::<f64>()) as u64);
        let mut interval =
            tokio::time::interval_at(Instant::now() + jitter, Duration::from_millis(interval_ms));
        acked.store(true, Ordering::Relaxed);

        loop {
            interval.tick().await;
            if !acked.swap(false, Ordering::Relaxed) {
                warn!("Heartbeat not acknowledged; closing zombied connection");
                let _ = tx_hb.send(Message::Close(None));
                break;
            }
            let Some(hb) = heartbeat_message(seq.load(Ordering::Relaxed)) else {
                continue;
            };
            if tx_hb.send(hb).is_err() {
                break; // channel closed, session ending
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_carries_sequence_or_null() {
        let Some(Message::Text(first)) = heartbeat_message(-1) else {
            panic!("expected text frame");
        };
        assert_eq!(first.as_str(), r#"{"op":1,"d":null}"#);

        let Some(Message::Text(later)) = heartbeat_message(17) else {
            panic!("expected text frame");
        };
        assert_eq!(later.as_str(), r#"{"op":1,"d":17}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_beat_closes_the_connection() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let seq = Arc::new(AtomicI64::new(3));
        let acked = Arc::new(AtomicBool::new(true));
        let handle = spawn_heartbeat(tx, seq, acked.clone(), 1_000);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, Message::Text(ref t) if t.as_str() == r#"{"op":1,"d":3}"#));

        // no ack arrives before the next tick
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, Message::Close(None)));
        handle.await.unwrap();
    }
}
