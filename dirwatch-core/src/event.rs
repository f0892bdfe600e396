//! Change events.
//!
//! An Event is just a path and what happened to it. Events are plain
//! values: two events with the same path and kind are the same event.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What happened to a path between two scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The path appeared.
    Added,
    /// The path's modification metadata changed.
    Modified,
    /// The path disappeared.
    Removed,
    /// The path has stopped changing after an add or modify.
    /// Only produced when stability tracking is enabled.
    Stable,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Stable => "stable",
        };
        write!(f, "{}", s)
    }
}

/// A single change to a single path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub path: PathBuf,
    pub kind: EventKind,
}

impl Event {
    pub fn new(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn added(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EventKind::Added)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EventKind::Modified)
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EventKind::Removed)
    }

    pub fn stable(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EventKind::Stable)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}

/// Events produced by one scan cycle, in discovery order.
pub type EventBatch = Vec<Event>;
