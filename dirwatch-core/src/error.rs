//! Error types shared by the dirwatch crates.
//!
//! Only the failures a caller can act on show up here. Trouble with a
//! single entry during a scan is not an error at all; the entry is
//! simply left out of the snapshot.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience type for fallible dirwatch operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Things that can go wrong while setting up or running a watcher.
#[derive(Error, Debug)]
pub enum WatchError {
    /// A watched root is missing, unreadable, or not a directory.
    #[error("cannot scan root '{path}': {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The change source could not begin listening.
    #[error("change source failed to start: {0}")]
    Source(String),

    /// Rejected configuration (bad glob, zero stability count, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The operation needs a stopped watcher.
    #[error("watcher is running")]
    Running,

    /// Reading or writing a persisted snapshot failed.
    #[error("snapshot file '{path}': {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted snapshot could not be decoded.
    #[error("malformed snapshot: {0}")]
    Serde(#[from] serde_json::Error),

    /// Spawning the run-loop thread failed.
    #[error("failed to spawn scanner thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl WatchError {
    /// Creates a root error with the path for context.
    pub fn root(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Root {
            path: path.into(),
            source,
        }
    }

    /// Creates a persistence error with the path for context.
    pub fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persist {
            path: path.into(),
            source,
        }
    }
}
