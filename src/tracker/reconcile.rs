use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    common::{clock::parse_timestamp, types::UserId},
    tracker::{
        ledger::{ActiveSessionRecord, LedgerStore, SessionSummary},
        session::{Session, SessionTracker},
    },
};

/// How a persisted open session was resolved at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    NoRecord,
    /// The stored start could not be parsed; the record was removed.
    Dropped(ActiveSessionRecord),
    /// The user is still playing (or could not be observed); the original start
    /// time was restored into the tracker.
    Resumed(Session),
    /// The user stopped while the bot was down; the session was closed at `now`.
    Closed(SessionSummary),
}

/// Resolves the persisted open session for `user` against a fresh presence
/// read. `activities` is `None` when the user could not be looked up at all, in
/// which case the session is resumed rather than closed on missing evidence.
pub fn reconcile(
    store: &mut LedgerStore,
    tracker: &mut SessionTracker,
    user: UserId,
    activities: Option<&[String]>,
    now: OffsetDateTime,
) -> Reconciliation {
    let Some(record) = store.ledger().active_for(user).cloned() else {
        return Reconciliation::NoRecord;
    };

    let Some(start) = parse_timestamp(&record.start) else {
        warn!(
            "Dropping open session for {}: unparseable start {:?}",
            user, record.start
        );
        store.drop_active(user);
        return Reconciliation::Dropped(record);
    };

    let still_playing = match activities {
        Some(activities) => tracker.detect(activities).is_some(),
        None => {
            warn!("Presence for {} unavailable during reconciliation; resuming session", user);
            true
        }
    };

    if still_playing {
        let session = Session {
            game: record.game,
            start,
        };
        info!(
            "Resuming {} session for {} started at {}",
            session.game, user, record.start
        );
        tracker.begin(user, session.clone());
        return Reconciliation::Resumed(session);
    }

    let summary = store.close_session(user, &record.game, start, now);
    tracker.end(user);
    info!(
        "Closed stale {} session for {}: {} (total {})",
        summary.game, user, summary.duration_human, summary.total_human
    );
    Reconciliation::Closed(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::matcher::TitleMatcher;
    use tempfile::TempDir;
    use time::{Duration, macros::datetime};

    const USER: UserId = UserId(369975308767461378);

    fn setup(dir: &TempDir) -> (LedgerStore, SessionTracker) {
        (
            LedgerStore::load(dir.path().join("playtime.json")),
            SessionTracker::new(TitleMatcher::new(["Celeste", "Persona 5"])),
        )
    }

    #[test]
    fn nothing_persisted_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let (mut store, mut tracker) = setup(&dir);
        let r = reconcile(&mut store, &mut tracker, USER, Some(&[]), datetime!(2025-03-01 10:00 UTC));
        assert_eq!(r, Reconciliation::NoRecord);
        assert!(tracker.current(USER).is_none());
    }

    #[test]
    fn stopped_while_offline_closes_with_persisted_start() {
        let dir = TempDir::new().unwrap();
        let (mut store, mut tracker) = setup(&dir);
        let t0 = datetime!(2025-03-01 10:00:00 UTC);
        store.open_session(USER, "Celeste", t0);

        // restart: a fresh process reloads the file
        let mut store = LedgerStore::load(store.path());
        let t1 = t0 + Duration::seconds(1800);
        let r = reconcile(&mut store, &mut tracker, USER, Some(&["Spotify".to_string()]), t1);

        let Reconciliation::Closed(summary) = r else {
            panic!("expected close, got {:?}", r);
        };
        assert_eq!(summary.duration_secs, 1800);
        assert_eq!(store.ledger().games["Celeste"].total_seconds, 1800);
        assert!(store.ledger().active_for(USER).is_none());
        assert!(tracker.current(USER).is_none());

        let on_disk = LedgerStore::load(store.path());
        assert!(on_disk.ledger().active_sessions.is_empty());
        assert_eq!(on_disk.ledger().games["Celeste"].total_seconds, 1800);
    }

    #[test]
    fn still_playing_resumes_with_original_start() {
        let dir = TempDir::new().unwrap();
        let (mut store, mut tracker) = setup(&dir);
        let t0 = datetime!(2025-03-01 10:00:00 -3);
        store.open_session(USER, "Celeste", t0);

        let r = reconcile(
            &mut store,
            &mut tracker,
            USER,
            Some(&["Celeste".to_string()]),
            t0 + Duration::hours(1),
        );

        assert!(matches!(r, Reconciliation::Resumed(_)));
        let session = tracker.current(USER).unwrap();
        assert_eq!(session.start, t0);
        assert_eq!(session.game, "Celeste");
        assert!(store.ledger().active_for(USER).is_some());
        assert_eq!(store.ledger().games["Celeste"].total_seconds, 0);
    }

    #[test]
    fn unresolvable_presence_resumes() {
        let dir = TempDir::new().unwrap();
        let (mut store, mut tracker) = setup(&dir);
        let t0 = datetime!(2025-03-01 10:00:00 UTC);
        store.open_session(USER, "Celeste", t0);

        let r = reconcile(&mut store, &mut tracker, USER, None, t0 + Duration::hours(1));
        assert!(matches!(r, Reconciliation::Resumed(_)));
        assert_eq!(tracker.current(USER).unwrap().start, t0);
    }

    #[test]
    fn unparseable_start_is_dropped_and_persisted() {
        let dir = TempDir::new().unwrap();
        let (mut store, mut tracker) = setup(&dir);
        store.open_session(USER, "Celeste", datetime!(2025-03-01 10:00 UTC));
        store
            .ledger_mut()
            .active_sessions
            .get_mut(&USER.to_string())
            .unwrap()
            .start = "31/02/2025 25:61".into();
        store.save().unwrap();

        let r = reconcile(
            &mut store,
            &mut tracker,
            USER,
            Some(&["Celeste".to_string()]),
            datetime!(2025-03-01 11:00 UTC),
        );

        assert!(matches!(r, Reconciliation::Dropped(ref rec) if rec.game == "Celeste"));
        assert!(tracker.current(USER).is_none());
        assert!(LedgerStore::load(store.path()).ledger().active_sessions.is_empty());
    }
}
