use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{
    common::types::UserId,
    configs::TrackerConfig,
    tracker::{
        ledger::LedgerStore,
        live::{self, LiveRefresh},
        matcher::TitleMatcher,
        notifier::{MessageSink, Notice, Notifier},
        query,
        reconcile::{self, Reconciliation},
        session::{Session, SessionTracker, Transition},
    },
};

/// Everything the poll, refresh and reconcile handlers share: the ledger, the
/// in-memory sessions and who is being tracked. Owned by a single task.
#[derive(Debug)]
pub struct TrackerService {
    user: UserId,
    display_name: String,
    store: LedgerStore,
    sessions: SessionTracker,
}

impl TrackerService {
    /// Loads the ledger named in the config.
    pub fn new(config: &TrackerConfig) -> Self {
        Self::from_parts(
            config.user_id,
            config.display_name.clone(),
            LedgerStore::load(&config.data_file),
            TitleMatcher::new(config.games.iter().cloned()),
        )
    }

    pub fn from_parts(
        user: UserId,
        display_name: String,
        store: LedgerStore,
        matcher: TitleMatcher,
    ) -> Self {
        Self {
            user,
            display_name,
            store,
            sessions: SessionTracker::new(matcher),
        }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn current(&self) -> Option<&Session> {
        self.sessions.current(self.user)
    }

    /// Applies one presence snapshot: persists the transition and returns the
    /// notices to announce, in order.
    pub fn apply<S: AsRef<str>>(
        &mut self,
        activities: &[S],
        now: OffsetDateTime,
    ) -> (Transition, Vec<Notice>) {
        let user = self.user;
        let transition = self.sessions.decide(user, activities);

        let notices = match &transition {
            Transition::Idle | Transition::Unchanged => Vec::new(),
            Transition::Start { game } => {
                self.log_match(activities);
                self.store.open_session(user, game, now);
                self.sessions.begin(user, Session { game: game.clone(), start: now });
                vec![Notice::Started { game: game.clone() }]
            }
            Transition::Stop { previous } => {
                let summary = self.store.close_session(user, &previous.game, previous.start, now);
                self.sessions.end(user);
                vec![Notice::Stopped(summary)]
            }
            Transition::Switch { previous, game } => {
                self.log_match(activities);
                let summary = self.store.switch_session(
                    user,
                    (&previous.game, previous.start),
                    game,
                    now,
                );
                self.sessions.begin(user, Session { game: game.clone(), start: now });
                vec![
                    Notice::Stopped(summary),
                    Notice::Started { game: game.clone() },
                ]
            }
        };

        if !notices.is_empty() {
            debug!("Transition for {}: {:?}", user, transition);
        }
        (transition, notices)
    }

    fn log_match<S: AsRef<str>>(&self, activities: &[S]) {
        if let Some(m) = self.sessions.detect(activities) {
            info!("{} is playing {:?} (allow-list entry {:?})", self.user, m.activity, m.title);
        }
    }

    /// Poll handler: apply the snapshot and announce the result.
    pub async fn observe<S: AsRef<str>>(
        &mut self,
        activities: &[S],
        now: OffsetDateTime,
        sink: &dyn MessageSink,
    ) -> Transition {
        let (transition, notices) = self.apply(activities, now);
        Notifier::new(sink, &self.display_name).announce(&notices).await;
        transition
    }

    /// Live-refresh handler.
    pub fn refresh_live(&mut self, now: OffsetDateTime) -> LiveRefresh {
        live::refresh(&mut self.store, now)
    }

    /// Startup handler; announces only when a stale session had to be closed.
    pub async fn reconcile(
        &mut self,
        activities: Option<&[String]>,
        now: OffsetDateTime,
        sink: &dyn MessageSink,
    ) -> Reconciliation {
        let outcome =
            reconcile::reconcile(&mut self.store, &mut self.sessions, self.user, activities, now);
        if let Reconciliation::Closed(summary) = &outcome {
            Notifier::new(sink, &self.display_name)
                .announce(&[Notice::Reconciled(summary.clone())])
                .await;
        }
        outcome
    }

    /// Shutdown handler: mirror every in-memory session into the ledger and
    /// save. Returns whether the save succeeded.
    pub fn flush(&mut self) -> bool {
        let missing: Vec<(UserId, Session)> = self
            .sessions
            .sessions()
            .filter(|(user, session)| {
                self.store.ledger().active_for(*user).is_none_or(|r| {
                    r.game != session.game
                        || crate::common::clock::parse_timestamp(&r.start) != Some(session.start)
                })
            })
            .map(|(user, session)| (user, session.clone()))
            .collect();

        for (user, session) in &missing {
            info!("Persisting open {} session for {} before exit", session.game, user);
            self.store.set_active(*user, &session.game, session.start);
        }
        self.store.save_or_warn()
    }

    /// All totals as they are on disk, so external edits show up. The
    /// in-memory ledger is left alone.
    pub fn totals_report(&self) -> String {
        query::totals_report(&self.store.read_snapshot(), &self.display_name)
    }

    pub fn in_progress_report(&self, now: OffsetDateTime) -> String {
        query::in_progress_report(self.current(), &self.display_name, now)
    }

    pub fn game_report(&self, name: &str) -> String {
        query::game_report(self.store.ledger(), name)
    }
}
