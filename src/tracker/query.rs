//! Read-only reports over the ledger and the in-memory session.

use time::OffsetDateTime;

use crate::tracker::{
    format::human_elapsed,
    ledger::{GameRecord, Ledger},
    session::Session,
};

pub const NO_DATA: &str = "📊 No play time recorded yet.";

/// One line per game: the live projection when a session is open, else the
/// settled total.
pub fn totals_report(ledger: &Ledger, who: &str) -> String {
    if ledger.games.is_empty() {
        return NO_DATA.to_string();
    }

    let mut msg = format!("🎮 **Total play time for {}:**\n", who);
    for (game, record) in &ledger.games {
        match &record.live_total_time_human {
            Some(live) => msg.push_str(&format!("- **{}**: {} (in progress)\n", game, live)),
            None => msg.push_str(&format!("- **{}**: {}\n", game, record.total_time_human)),
        }
    }
    msg.trim_end().to_string()
}

pub fn in_progress_report(session: Option<&Session>, who: &str, now: OffsetDateTime) -> String {
    let Some(session) = session else {
        return format!("⏳ {} is not playing right now.", who);
    };
    let elapsed = (now - session.start).whole_seconds().max(0) as u64;
    format!(
        "🎮 **{}** in progress:\n🕒 Current session: **{}**",
        session.game,
        human_elapsed(elapsed)
    )
}

/// Resolves free text to a game key: exact match first, then the first key
/// (in ledger order) containing the text case-insensitively.
pub fn find_game<'a>(ledger: &'a Ledger, query: &str) -> Option<(&'a str, &'a GameRecord)> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    if let Some((name, record)) = ledger.games.get_key_value(query) {
        return Some((name.as_str(), record));
    }
    let lowered = query.to_lowercase();
    ledger
        .games
        .iter()
        .find(|(name, _)| name.to_lowercase().contains(&lowered))
        .map(|(name, record)| (name.as_str(), record))
}

pub fn game_report(ledger: &Ledger, query: &str) -> String {
    match find_game(ledger, query) {
        Some((name, record)) => {
            let mut msg = format!("🎮 **{}**: {}", name, record.total_time_human);
            if let Some(live) = &record.live_total_time_human {
                msg.push_str(&format!(" (in progress: {})", live));
            }
            msg
        }
        None => format!("📊 No play time recorded for \"{}\".", query.trim()),
    }
}
