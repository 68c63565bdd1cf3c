use std::collections::HashMap;

use time::OffsetDateTime;

use crate::{
    common::types::UserId,
    tracker::{
        ledger::ACTIVE_SESSIONS_KEY,
        matcher::{TitleMatch, TitleMatcher},
    },
};

/// An open play interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub game: String,
    pub start: OffsetDateTime,
}

/// What a presence snapshot means for a user's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Not playing before, not playing now.
    Idle,
    /// Still playing the same game.
    Unchanged,
    Start { game: String },
    Stop { previous: Session },
    Switch { previous: Session, game: String },
}

/// In-memory view of who is playing what. Decisions are pure; callers apply
/// them (persist, announce) and then commit them here.
#[derive(Debug)]
pub struct SessionTracker {
    matcher: TitleMatcher,
    sessions: HashMap<UserId, Session>,
}

impl SessionTracker {
    pub fn new(matcher: TitleMatcher) -> Self {
        Self {
            matcher,
            sessions: HashMap::new(),
        }
    }

    pub fn current(&self, user: UserId) -> Option<&Session> {
        self.sessions.get(&user)
    }

    pub fn sessions(&self) -> impl Iterator<Item = (UserId, &Session)> {
        self.sessions.iter().map(|(u, s)| (*u, s))
    }

    /// First allow-listed game among `activities`. An activity named like the
    /// ledger's reserved key is never a game, since its time could not be stored.
    pub fn detect<S: AsRef<str>>(&self, activities: &[S]) -> Option<TitleMatch> {
        self.matcher.find(
            activities
                .iter()
                .map(|a| a.as_ref())
                .filter(|a| *a != ACTIVE_SESSIONS_KEY),
        )
    }

    pub fn decide<S: AsRef<str>>(&self, user: UserId, activities: &[S]) -> Transition {
        let playing = self.detect(activities).map(|m| m.activity);
        match (self.sessions.get(&user), playing) {
            (None, None) => Transition::Idle,
            (None, Some(game)) => Transition::Start { game },
            (Some(previous), None) => Transition::Stop {
                previous: previous.clone(),
            },
            (Some(previous), Some(game)) if previous.game == game => Transition::Unchanged,
            (Some(previous), Some(game)) => Transition::Switch {
                previous: previous.clone(),
                game,
            },
        }
    }

    /// Records `session` as the user's open session, replacing any previous one.
    pub fn begin(&mut self, user: UserId, session: Session) {
        self.sessions.insert(user, session);
    }

    pub fn end(&mut self, user: UserId) -> Option<Session> {
        self.sessions.remove(&user)
    }
}
