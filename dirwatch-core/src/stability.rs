//! Stability tracking.
//!
//! Some consumers only care about a file once writers are done with it.
//! The tracker watches each batch and, once a path that was added or
//! modified has gone `threshold` cycles without changing again, reports
//! it as stable exactly once.

use crate::error::{Result, WatchError};
use crate::event::{Event, EventKind};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Counts quiet cycles for recently changed paths.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    threshold: u32,
    pending: IndexMap<PathBuf, u32>,
}

impl StabilityTracker {
    /// Creates a tracker that reports a path after `threshold` quiet cycles.
    pub fn new(threshold: u32) -> Result<Self> {
        if threshold == 0 {
            return Err(WatchError::Config(
                "stable count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            threshold,
            pending: IndexMap::new(),
        })
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Number of paths currently waiting to become stable.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Feeds one cycle's batch and returns the stable events it produced.
    pub fn observe(&mut self, batch: &[Event]) -> Vec<Event> {
        let touched: HashSet<&Path> = batch.iter().map(|e| e.path.as_path()).collect();

        let mut stable = Vec::new();
        self.pending.retain(|path, remaining| {
            if touched.contains(path.as_path()) {
                return true;
            }
            *remaining -= 1;
            if *remaining == 0 {
                stable.push(Event::stable(path.clone()));
                false
            } else {
                true
            }
        });

        for event in batch {
            match event.kind {
                EventKind::Added | EventKind::Modified => {
                    self.pending.insert(event.path.clone(), self.threshold);
                }
                EventKind::Removed => {
                    self.pending.shift_remove(&event.path);
                }
                EventKind::Stable => {}
            }
        }

        stable
    }
}
