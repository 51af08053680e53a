use std::path::PathBuf;
use thiserror::Error;

/// Errors that end a sync or stats run.
///
/// A rate-limit response is deliberately absent: it is reported as a
/// [`PageOutcome::RateLimited`](crate::strava::PageOutcome) and never raised.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to get access token: {status} {body}")]
    Authentication { status: u16, body: String },

    #[error("failed to retrieve {what}: {status} {body}")]
    Fetch {
        what: &'static str,
        status: u16,
        body: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("checkpoint file {path} is corrupt: {source}")]
    CorruptCheckpoint {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpoint file {path}: {source}")]
    CheckpointIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("activity #{index} has no usable start_date")]
    MissingStartDate { index: usize },

    #[error("failed to write csv {path}: {message}")]
    SinkWrite { path: PathBuf, message: String },
}

impl SyncError {
    pub(crate) fn sink(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        SyncError::SinkWrite {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
