//! Dirwatch Core - snapshots, events and the diff engine
//!
//! This crate holds the pieces of dirwatch that never touch a thread:
//! the snapshot of a directory tree, the events produced when two
//! snapshots disagree, and the pure function that compares them.
//!
//! # Example
//!
//! ```
//! use dirwatch_core::{diff, EventKind, FileStat, Snapshot};
//! use std::time::{Duration, UNIX_EPOCH};
//!
//! let before = Snapshot::new();
//! let mut after = Snapshot::new();
//! after.insert("/tmp/a.txt", FileStat::file(UNIX_EPOCH + Duration::from_secs(1)));
//!
//! let events = diff(&before, &after);
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].kind, EventKind::Added);
//! ```

pub mod diff;
pub mod error;
pub mod event;
pub mod snapshot;
pub mod stability;

pub use diff::diff;
pub use error::{Result, WatchError};
pub use event::{Event, EventBatch, EventKind};
pub use snapshot::{FileKind, FileStat, Snapshot};
pub use stability::StabilityTracker;
