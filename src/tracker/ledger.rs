//! Durable play-time ledger.
//!
//! On disk the ledger is one flat JSON object: every game name is a top-level
//! key holding a [`GameRecord`], and the reserved key `active_sessions` maps user
//! ids to the session each user had open when the file was last written:
//!
//! ```json
//! {
//!   "Persona 5 Royal": { "total_seconds": 5400, "total_time_human": "1h 30min" },
//!   "active_sessions": { "369975308767461378": { "game": "Persona 5 Royal", "start": "2025-03-01T21:15:09-03:00" } }
//! }
//! ```
//!
//! In memory the two halves are kept apart in [`Ledger`]. Every write goes to a
//! temp file in the same directory which is then renamed over the target, so a
//! reader never observes a half-written document.

use std::{
    collections::BTreeMap,
    fmt,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{
    common::{clock::format_timestamp, errors::LedgerError, types::UserId},
    tracker::format::{clock_duration, human_total},
};

/// Top-level key reserved for open sessions.
pub const ACTIVE_SESSIONS_KEY: &str = "active_sessions";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    #[serde(default)]
    pub total_seconds: u64,
    #[serde(default = "zero_human")]
    pub total_time_human: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_session: Option<LastSession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_total_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_total_time_human: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_updated_at: Option<String>,
}

impl Default for GameRecord {
    fn default() -> Self {
        Self {
            total_seconds: 0,
            total_time_human: zero_human(),
            last_session: None,
            live_total_seconds: None,
            live_total_time_human: None,
            live_updated_at: None,
        }
    }
}

impl GameRecord {
    pub fn has_live(&self) -> bool {
        self.live_total_seconds.is_some()
    }

    pub fn clear_live(&mut self) {
        self.live_total_seconds = None;
        self.live_total_time_human = None;
        self.live_updated_at = None;
    }
}

fn zero_human() -> String {
    human_total(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSession {
    pub start: String,
    pub end: String,
    /// `H:MM:SS`
    pub duration: String,
}

/// Persisted mirror of an open session. `start` stays textual so a corrupt
/// timestamp still loads and can be dropped during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSessionRecord {
    pub game: String,
    pub start: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    pub games: BTreeMap<String, GameRecord>,
    pub active_sessions: BTreeMap<String, ActiveSessionRecord>,
}

impl Ledger {
    pub fn is_empty(&self) -> bool {
        self.games.is_empty() && self.active_sessions.is_empty()
    }

    pub fn active_for(&self, user: UserId) -> Option<&ActiveSessionRecord> {
        self.active_sessions.get(&user.to_string())
    }
}

impl Serialize for Ledger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (name, record) in &self.games {
            // A game literally named like the reserved key cannot round-trip.
            if name == ACTIVE_SESSIONS_KEY {
                warn!(
                    "Not saving {}s recorded under the reserved name {:?}",
                    record.total_seconds, name
                );
                continue;
            }
            map.serialize_entry(name, record)?;
        }
        map.serialize_entry(ACTIVE_SESSIONS_KEY, &self.active_sessions)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Ledger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LedgerVisitor;

        impl<'de> Visitor<'de> for LedgerVisitor {
            type Value = Ledger;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of game names to records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Ledger, A::Error> {
                let mut ledger = Ledger::default();
                while let Some(key) = access.next_key::<String>()? {
                    if key == ACTIVE_SESSIONS_KEY {
                        let sessions: Option<BTreeMap<String, ActiveSessionRecord>> =
                            access.next_value()?;
                        ledger.active_sessions = sessions.unwrap_or_default();
                    } else {
                        let record: GameRecord = access.next_value()?;
                        ledger.games.insert(key, record);
                    }
                }
                Ok(ledger)
            }
        }

        deserializer.deserialize_map(LedgerVisitor)
    }
}

/// What a closed session added, for announcements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub game: String,
    pub duration_secs: u64,
    pub total_secs: u64,
    /// `H:MM:SS`
    pub duration_human: String,
    /// `{h}h {m}min`
    pub total_human: String,
}

/// Owns the ledger file and its in-memory copy.
#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
    ledger: Ledger,
}

impl LedgerStore {
    /// Reads the ledger at `path`. A missing file yields an empty ledger; an
    /// unreadable or malformed one is moved aside to `<file>.corrupt` and also
    /// yields an empty ledger. Never fails.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ledger = read_ledger(&path);
        Self { path, ledger }
    }

    /// The document as it is on disk now, for reports that should pick up
    /// external edits. Leaves the in-memory ledger and the file untouched; if
    /// the file is missing or unusable the in-memory ledger is returned.
    pub fn read_snapshot(&self) -> Ledger {
        match parse_file(&self.path) {
            Ok(Some(ledger)) => ledger,
            Ok(None) => self.ledger.clone(),
            Err(e) => {
                warn!(
                    "Ledger {} unusable for a snapshot ({}); using the in-memory copy",
                    self.path.display(),
                    e
                );
                self.ledger.clone()
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub fn save(&self) -> Result<(), LedgerError> {
        let content = serde_json::to_string_pretty(&self.ledger)?;
        write_atomic(&self.path, content.as_bytes())
    }

    /// Saves, logging instead of failing. The in-memory ledger stays
    /// authoritative and the next mutation writes it again.
    pub fn save_or_warn(&self) -> bool {
        match self.save() {
            Ok(()) => true,
            Err(e) => {
                warn!("Ledger not saved: {}", e);
                false
            }
        }
    }

    /// Records an open session for `user` and makes sure the game has a record.
    pub fn open_session(&mut self, user: UserId, game: &str, start: OffsetDateTime) {
        self.set_active(user, game, start);
        self.ledger.games.entry(game.to_string()).or_default();
        self.save_or_warn();
    }

    /// Writes the active-session mirror without saving.
    pub fn set_active(&mut self, user: UserId, game: &str, start: OffsetDateTime) {
        self.ledger.active_sessions.insert(
            user.to_string(),
            ActiveSessionRecord {
                game: game.to_string(),
                start: format_timestamp(start),
            },
        );
    }

    /// Folds a finished session into the game's total, clears its live
    /// projection and the user's active record, then saves.
    pub fn close_session(
        &mut self,
        user: UserId,
        game: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> SessionSummary {
        let summary = self.record_close(user, game, start, end);
        self.save_or_warn();
        summary
    }

    /// Closes one session and opens the next with a single write, so the file
    /// never shows the user between games.
    pub fn switch_session(
        &mut self,
        user: UserId,
        previous: (&str, OffsetDateTime),
        next: &str,
        at: OffsetDateTime,
    ) -> SessionSummary {
        let (game, start) = previous;
        let summary = self.record_close(user, game, start, at);
        self.open_session(user, next, at);
        summary
    }

    fn record_close(
        &mut self,
        user: UserId,
        game: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> SessionSummary {
        let duration_secs = (end - start).whole_seconds().max(0) as u64;

        let record = self.ledger.games.entry(game.to_string()).or_default();
        record.total_seconds = record.total_seconds.saturating_add(duration_secs);
        record.total_time_human = human_total(record.total_seconds);
        record.last_session = Some(LastSession {
            start: format_timestamp(start),
            end: format_timestamp(end),
            duration: clock_duration(duration_secs),
        });
        record.clear_live();

        let summary = SessionSummary {
            game: game.to_string(),
            duration_secs,
            total_secs: record.total_seconds,
            duration_human: clock_duration(duration_secs),
            total_human: record.total_time_human.clone(),
        };

        self.ledger.active_sessions.remove(&user.to_string());

        debug!(
            "Closed {} session: +{}s, total {}s",
            game, summary.duration_secs, summary.total_secs
        );
        summary
    }

    /// Removes the user's active record and saves. Returns what was removed.
    pub fn drop_active(&mut self, user: UserId) -> Option<ActiveSessionRecord> {
        let removed = self.ledger.active_sessions.remove(&user.to_string());
        if removed.is_some() {
            self.save_or_warn();
        }
        removed
    }
}

/// Why the file on disk could not be turned into a [`Ledger`].
#[derive(Debug)]
enum ReadFailure {
    Io(io::Error),
    Malformed(serde_json::Error),
}

impl fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot read: {}", e),
            Self::Malformed(e) => write!(f, "malformed: {}", e),
        }
    }
}

/// `Ok(None)` when there is no file or it is blank.
fn parse_file(path: &Path) -> Result<Option<Ledger>, ReadFailure> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ReadFailure::Io(e)),
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<Ledger>(&raw)
        .map(Some)
        .map_err(ReadFailure::Malformed)
}

fn read_ledger(path: &Path) -> Ledger {
    match parse_file(path) {
        Ok(Some(ledger)) => {
            debug!(
                "Loaded ledger {} ({} games, {} open sessions)",
                path.display(),
                ledger.games.len(),
                ledger.active_sessions.len()
            );
            ledger
        }
        Ok(None) => {
            info!("No ledger at {}; starting empty", path.display());
            Ledger::default()
        }
        Err(ReadFailure::Io(e)) => {
            warn!("Cannot read ledger {}: {}; starting empty", path.display(), e);
            Ledger::default()
        }
        Err(ReadFailure::Malformed(e)) => {
            let aside = corrupt_path(path);
            warn!(
                "Ledger {} is malformed ({}); moving it to {} and starting empty",
                path.display(),
                e,
                aside.display()
            );
            if let Err(e) = fs::rename(path, &aside) {
                warn!("Could not move malformed ledger aside: {}", e);
            }
            Ledger::default()
        }
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".corrupt");
    path.with_file_name(name)
}

/// Writes `content` to a sibling temp file and renames it over `path`.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<(), LedgerError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| LedgerError::io("creating temp file", dir, e))?;
    tmp.write_all(content)
        .map_err(|e| LedgerError::io("writing temp file", tmp.path(), e))?;
    tmp.flush()
        .map_err(|e| LedgerError::io("flushing temp file", tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| LedgerError::io("syncing temp file", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| LedgerError::io("replacing ledger", path, e.error))?;
    Ok(())
}
