use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{
    common::clock::{format_timestamp, parse_timestamp},
    tracker::{format::human_total, ledger::LedgerStore},
};

/// Result of one projection pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LiveRefresh {
    /// Games whose projection changed.
    pub updated: usize,
    /// Active records skipped because their start could not be parsed.
    pub skipped: usize,
    pub saved: bool,
}

/// Projects "total if the session ended now" into each open session's game
/// record. Only the `live_*` fields are written; `total_seconds` is left for
/// the session close.
pub fn refresh(store: &mut LedgerStore, now: OffsetDateTime) -> LiveRefresh {
    let mut outcome = LiveRefresh::default();
    let ledger = store.ledger_mut();

    let active: Vec<(String, String, String)> = ledger
        .active_sessions
        .iter()
        .map(|(user, r)| (user.clone(), r.game.clone(), r.start.clone()))
        .collect();

    for (user, game, raw_start) in active {
        let Some(start) = parse_timestamp(&raw_start) else {
            warn!(
                "Active session for {} has an unparseable start {:?}; not projecting",
                user, raw_start
            );
            outcome.skipped += 1;
            continue;
        };

        let elapsed = (now - start).whole_seconds();
        let record = ledger.games.entry(game.clone()).or_default();
        let projected = (record.total_seconds as i64).saturating_add(elapsed).max(0) as u64;

        if record.live_total_seconds == Some(projected) {
            continue;
        }

        record.live_total_seconds = Some(projected);
        record.live_total_time_human = Some(human_total(projected));
        record.live_updated_at = Some(format_timestamp(now));
        outcome.updated += 1;
        debug!("Live projection for {}: {}s", game, projected);
    }

    if outcome.updated > 0 {
        outcome.saved = store.save_or_warn();
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::UserId;
    use std::fs;
    use tempfile::TempDir;
    use time::{Duration, macros::datetime};

    const USER: UserId = UserId(7);

    fn store_with_total(dir: &TempDir, total: u64) -> LedgerStore {
        let mut store = LedgerStore::load(dir.path().join("playtime.json"));
        let t0 = datetime!(2025-03-01 08:00:00 UTC);
        store.close_session(USER, "Celeste", t0, t0 + Duration::seconds(total as i64));
        store
    }

    #[test]
    fn projects_base_plus_elapsed_without_touching_total() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_total(&dir, 3600);
        let start = datetime!(2025-03-01 10:00:00 UTC);
        store.open_session(USER, "Celeste", start);

        let outcome = refresh(&mut store, start + Duration::seconds(125));
        assert_eq!(outcome.updated, 1);
        assert!(outcome.saved);

        let record = &store.ledger().games["Celeste"];
        assert_eq!(record.total_seconds, 3600);
        assert_eq!(record.live_total_seconds, Some(3725));
        assert_eq!(record.live_total_time_human.as_deref(), Some("1h 2min"));
        assert_eq!(record.live_updated_at.as_deref(), Some("2025-03-01T10:02:05Z"));

        let on_disk = LedgerStore::load(store.path());
        assert_eq!(on_disk.ledger().games["Celeste"].live_total_seconds, Some(3725));
        assert_eq!(on_disk.ledger().games["Celeste"].total_seconds, 3600);
    }

    #[test]
    fn unchanged_projection_skips_the_write() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_total(&dir, 0);
        let start = datetime!(2025-03-01 10:00:00 UTC);
        store.open_session(USER, "Celeste", start);

        let now = start + Duration::seconds(60);
        assert_eq!(refresh(&mut store, now).updated, 1);

        fs::remove_file(store.path()).unwrap();
        let again = refresh(&mut store, now);
        assert_eq!(again.updated, 0);
        assert!(!again.saved);
        assert!(!store.path().exists());
    }

    #[test]
    fn projection_is_cleared_by_close() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_total(&dir, 100);
        let start = datetime!(2025-03-01 10:00:00 UTC);
        store.open_session(USER, "Celeste", start);
        refresh(&mut store, start + Duration::seconds(50));

        let summary = store.close_session(USER, "Celeste", start, start + Duration::seconds(80));
        assert_eq!(summary.total_secs, 180);
        assert!(!store.ledger().games["Celeste"].has_live());
    }

    #[test]
    fn clock_skew_never_projects_below_zero() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_total(&dir, 0);
        let start = datetime!(2025-03-01 10:00:00 UTC);
        store.open_session(USER, "Celeste", start);

        refresh(&mut store, start - Duration::seconds(30));
        assert_eq!(store.ledger().games["Celeste"].live_total_seconds, Some(0));
    }

    #[test]
    fn bad_start_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_total(&dir, 0);
        store.ledger_mut().active_sessions.insert(
            USER.to_string(),
            crate::tracker::ledger::ActiveSessionRecord {
                game: "Celeste".into(),
                start: "not a time".into(),
            },
        );

        let outcome = refresh(&mut store, datetime!(2025-03-01 10:00:00 UTC));
        assert_eq!(outcome, LiveRefresh { updated: 0, skipped: 1, saved: false });
        assert!(!store.ledger().games["Celeste"].has_live());
    }

    #[test]
    fn no_active_sessions_means_no_work() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_total(&dir, 10);
        assert_eq!(refresh(&mut store, datetime!(2025-03-01 10:00:00 UTC)), LiveRefresh::default());
    }
}
