//! Dirwatch Watcher - scanning, signaling and dispatch
//!
//! This crate turns the pure pieces of `dirwatch-core` into a running
//! watcher:
//! - Collecting snapshots of the watched roots
//! - Waking up on a timer or on OS notifications
//! - Running the scan/diff/dispatch loop on its own thread
//! - Handing each batch to registered listeners
//!
//! Whatever wakes the scanner, the diff decides what changed.

mod collector;
mod config;
mod dispatch;
mod scanner;
mod source;

pub use collector::SnapshotCollector;
pub use config::{SourceKind, WatchConfig, DEFAULT_INTERVAL_MS};
pub use dispatch::{Dispatcher, Listener, ListenerError, ListenerId};
pub use notify::RecursiveMode;
pub use scanner::{Scanner, Signal};
pub use source::{available_sources, build_source, ChangeSource, NativeSource, PollingSource};
