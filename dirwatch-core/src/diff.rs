//! The diff engine.
//!
//! Compares two snapshots and reports what changed. This is a pure
//! function: the same two snapshots always give the same batch.

use crate::event::{Event, EventBatch};
use crate::snapshot::Snapshot;

/// Computes the events that turn `previous` into `current`.
///
/// - A path only in `current` is added.
/// - A path in both whose modification metadata differs is modified.
/// - A path only in `previous` is removed.
///
/// Added and modified events come first, in `current`'s discovery
/// order, followed by removals in `previous`'s order.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> EventBatch {
    let mut events = Vec::new();

    for (path, stat) in current.iter() {
        match previous.get(path) {
            None => events.push(Event::added(path)),
            Some(old) if old.modified != stat.modified || old.kind != stat.kind => {
                events.push(Event::modified(path))
            }
            Some(_) => {}
        }
    }

    for (path, _) in previous.iter() {
        if !current.contains(path) {
            events.push(Event::removed(path));
        }
    }

    events
}
