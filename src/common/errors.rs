use std::path::PathBuf;

/// Failures while reading or writing the play-time ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{context} ({path}): {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LedgerError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

/// Failures talking to the Discord HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("discord returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rate limited for {retry_after:.2}s")]
    RateLimited { retry_after: f64 },
}

/// Failures that stop the bot before it starts tracking.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("another instance holds the lock file {0}")]
    AlreadyRunning(PathBuf),

    #[error("cannot create lock file {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}
