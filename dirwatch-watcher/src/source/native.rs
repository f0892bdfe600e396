//! OS notification change source.
//!
//! Wraps the notify crate's recommended watcher. The callback only forwards
//! into a channel; a listener thread owns the watcher, turns each reported
//! event into a single wake-up and keeps the root watches armed.
//!
//! Open and read accesses are not wake-ups: every scan opens the
//! directories it walks, so counting them would keep the scanner busy
//! forever. Close-after-write is kept because on Linux it is the last
//! event a finished write produces.
//!
//! A root that doesn't exist yet is not an error. Its nearest existing
//! ancestor is watched non-recursively instead, and the recursive watch
//! moves back onto the root as soon as it appears. A root removed or
//! renamed while running goes through the same fallback, since the OS
//! drops a watch whose directory is gone.

use super::ChangeSource;
use crate::config::SourceKind;
use crate::scanner::Signal;
use dirwatch_core::{Result, WatchError};
use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

enum Message {
    Notify(notify::Result<Event>),
    Stop,
}

/// What is currently watched on behalf of one root.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Armed {
    Root,
    Ancestor(PathBuf),
}

/// Signals the scanner whenever the OS reports activity under a root.
pub struct NativeSource {
    roots: Vec<PathBuf>,
    mode: RecursiveMode,
    listener: Option<(Sender<Message>, JoinHandle<()>)>,
}

impl NativeSource {
    pub fn new(roots: Vec<PathBuf>, mode: RecursiveMode) -> Self {
        Self {
            roots,
            mode,
            listener: None,
        }
    }
}

impl ChangeSource for NativeSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Native
    }

    fn start(&mut self, signal: Signal) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }

        let (tx, rx) = channel();
        let forward = tx.clone();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = forward.send(Message::Notify(res));
        })
        .map_err(|e| WatchError::Source(e.to_string()))?;

        let mut watches = Watches {
            watcher,
            mode: self.mode,
            roots: self
                .roots
                .iter()
                .map(|root| (root.clone(), Armed::Root))
                .collect(),
        };
        for idx in 0..watches.roots.len() {
            watches.arm(idx).map_err(|e| {
                WatchError::Source(format!(
                    "failed to watch {}: {}",
                    watches.roots[idx].0.display(),
                    e
                ))
            })?;
        }

        let handle = thread::Builder::new()
            .name("dirwatch-notify".into())
            .spawn(move || listen(watches, rx, signal))
            .map_err(|e| WatchError::Source(format!("failed to spawn listener: {}", e)))?;

        self.listener = Some((tx, handle));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some((tx, handle)) = self.listener.take() {
            // The watcher holds a sender too, so the channel never closes on its own.
            // Dropping the watcher on the way out releases every watch.
            let _ = tx.send(Message::Stop);
            if handle.join().is_err() {
                warn!("Notification listener thread panicked");
            }
        }
    }
}

impl Drop for NativeSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listen(mut watches: Watches, rx: Receiver<Message>, signal: Signal) {
    for message in rx {
        match message {
            Message::Stop => break,
            Message::Notify(Ok(event)) => {
                if !wakes(&event.kind) {
                    continue;
                }
                debug!("Change reported under {:?}", event.paths);
                // Re-arm before waking so the scan that follows can't miss anything
                watches.follow(&event);
                signal.signal();
            }
            Message::Notify(Err(e)) => warn!("Watch error: {}", e),
        }
    }
    debug!("Notification listener exited");
}

fn wakes(kind: &EventKind) -> bool {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        EventKind::Access(_) => false,
        _ => true,
    }
}

fn nearest_dir(root: &Path) -> Option<&Path> {
    root.ancestors().skip(1).find(|dir| dir.is_dir())
}

/// The watcher plus, per root, what it is watching for that root.
struct Watches {
    watcher: RecommendedWatcher,
    mode: RecursiveMode,
    roots: Vec<(PathBuf, Armed)>,
}

impl Watches {
    /// Watches the root if it is a directory, its nearest existing ancestor
    /// otherwise.
    fn arm(&mut self, idx: usize) -> notify::Result<()> {
        let root = self.roots[idx].0.clone();

        let armed = loop {
            if root.is_dir() {
                match self.watcher.watch(&root, self.mode) {
                    Ok(()) => break Armed::Root,
                    Err(e) if root.is_dir() => return Err(e),
                    Err(_) => {}
                }
            }

            let dir = nearest_dir(&root)
                .ok_or_else(|| notify::Error::path_not_found().add_path(root.clone()))?
                .to_path_buf();
            self.watcher.watch(&dir, RecursiveMode::NonRecursive)?;
            if !root.is_dir() && nearest_dir(&root) == Some(dir.as_path()) {
                break Armed::Ancestor(dir);
            }

            // Something appeared before the watch was in place; go again
            self.roots[idx].1 = Armed::Ancestor(dir);
            self.disarm(idx);
        };

        match &armed {
            Armed::Root => info!("Listening for changes in {}", root.display()),
            Armed::Ancestor(dir) => info!(
                "{} does not exist; listening in {} until it appears",
                root.display(),
                dir.display()
            ),
        }
        self.roots[idx].1 = armed;
        Ok(())
    }

    fn disarm(&mut self, idx: usize) {
        let path = match &self.roots[idx].1 {
            Armed::Root => self.roots[idx].0.clone(),
            Armed::Ancestor(dir) => dir.clone(),
        };
        let shared = self.roots.iter().enumerate().any(|(other, (root, armed))| {
            other != idx
                && match armed {
                    Armed::Root => *root == path,
                    Armed::Ancestor(dir) => *dir == path,
                }
        });
        if shared {
            return;
        }
        if let Err(e) = self.watcher.unwatch(&path) {
            // Expected when the directory is already gone
            debug!("Failed to unwatch {}: {}", path.display(), e);
        }
    }

    /// Moves watches after an event that may have made a root appear or
    /// disappear.
    fn follow(&mut self, event: &Event) {
        for idx in 0..self.roots.len() {
            let (root, armed) = &self.roots[idx];
            let rearm = match armed {
                Armed::Root => {
                    matches!(
                        event.kind,
                        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
                    ) && event.paths.iter().any(|p| root.starts_with(p))
                }
                // Event paths may not be spelled like the root, so ask the disk
                Armed::Ancestor(dir) => {
                    root.is_dir() || nearest_dir(root) != Some(dir.as_path())
                }
            };
            if !rearm {
                continue;
            }

            let root = root.clone();
            self.disarm(idx);
            if let Err(e) = self.arm(idx) {
                warn!("Failed to re-watch {}: {}", root.display(), e);
            }
        }
    }
}
