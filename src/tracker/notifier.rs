use async_trait::async_trait;
use tracing::{info, warn};

use crate::{common::types::AnyResult, tracker::ledger::SessionSummary};

/// Discord's per-message character limit.
pub const MESSAGE_LIMIT: usize = 2000;

/// The one platform capability the tracker needs: post text to the
/// announcement channel.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, content: &str) -> AnyResult<()>;
}

/// Announcement produced by a session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Started { game: String },
    Stopped(SessionSummary),
    /// Closed at startup because the user stopped playing while the bot was down.
    Reconciled(SessionSummary),
}

impl Notice {
    pub fn render(&self, who: &str) -> String {
        match self {
            Notice::Started { game } => {
                format!("🔥 **{}** started playing **{}** 🎮", who, game)
            }
            Notice::Stopped(s) => format!(
                "⏹️ **{}** stopped playing **{}**.\n🕒 Session: **{}**\n⌛ Total: **{}**",
                who, s.game, s.duration_human, s.total_human
            ),
            Notice::Reconciled(s) => format!(
                "⏹️ **{}** stopped playing **{}** while I was offline.\n🕒 Session: **{}**\n⌛ Total: **{}**",
                who, s.game, s.duration_human, s.total_human
            ),
        }
    }
}

/// Formats notices for the tracked user and posts them, one message each.
/// Delivery failures are logged and dropped; the ledger is already written.
pub struct Notifier<'a> {
    sink: &'a dyn MessageSink,
    display_name: &'a str,
}

impl<'a> Notifier<'a> {
    pub fn new(sink: &'a dyn MessageSink, display_name: &'a str) -> Self {
        Self { sink, display_name }
    }

    pub async fn announce(&self, notices: &[Notice]) {
        for notice in notices {
            match notice {
                Notice::Started { game } => info!("▶️ {} started {}", self.display_name, game),
                Notice::Stopped(s) | Notice::Reconciled(s) => info!(
                    "⏹️ {} stopped {} after {} (total {})",
                    self.display_name, s.game, s.duration_human, s.total_human
                ),
            }
            if let Err(e) = self.sink.send(&notice.render(self.display_name)).await {
                warn!("Failed to deliver announcement: {}", e);
            }
        }
    }
}

/// Splits `text` into chunks of at most `limit` characters, preferring line
/// boundaries. Lines longer than the limit are hard-split.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let needed = if current.is_empty() { line_len } else { line_len + 1 };

        if current_len + needed > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                current = piece.iter().collect();
                current_len = piece.len();
            }
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
