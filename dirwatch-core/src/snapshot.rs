//! Directory snapshots.
//!
//! A Snapshot records what a scan saw: every path it found, when that
//! path was last modified, and what kind of entry it is. Snapshots are
//! never patched in place once a scan finishes; the next scan simply
//! produces a new one.

use crate::error::{Result, WatchError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The type of filesystem entry recorded for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    File,
    Dir,
    Symlink,
}

impl FileKind {
    fn from_metadata(meta: &Metadata) -> Self {
        let ty = meta.file_type();
        if ty.is_symlink() {
            Self::Symlink
        } else if ty.is_dir() {
            Self::Dir
        } else {
            Self::File
        }
    }
}

/// Modification metadata for a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Last-modified timestamp as reported by the filesystem.
    pub modified: SystemTime,

    /// What sort of entry this is.
    pub kind: FileKind,
}

impl FileStat {
    /// A regular file modified at `modified`.
    pub fn file(modified: SystemTime) -> Self {
        Self {
            modified,
            kind: FileKind::File,
        }
    }

    /// A directory modified at `modified`.
    pub fn dir(modified: SystemTime) -> Self {
        Self {
            modified,
            kind: FileKind::Dir,
        }
    }

    /// Builds a stat from filesystem metadata.
    ///
    /// Returns None when the platform can't report a modification time.
    pub fn from_metadata(meta: &Metadata) -> Option<Self> {
        let modified = meta.modified().ok()?;
        Some(Self {
            modified,
            kind: FileKind::from_metadata(meta),
        })
    }
}

/// Mapping from absolute path to modification metadata.
///
/// Iteration follows insertion order, which for a collected snapshot is
/// the order the directory walk discovered entries in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: IndexMap<PathBuf, FileStat>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `stat` for `path`, replacing any earlier entry.
    pub fn insert(&mut self, path: impl Into<PathBuf>, stat: FileStat) {
        self.entries.insert(path.into(), stat);
    }

    /// Looks up the stat recorded for `path`.
    pub fn get(&self, path: &Path) -> Option<&FileStat> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &FileStat)> {
        self.entries.iter().map(|(p, s)| (p.as_path(), s))
    }

    /// Reads a snapshot previously written with [`Snapshot::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| WatchError::persist(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Writes the snapshot as JSON, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| WatchError::persist(parent, e))?;
        }
        let json = serde_json::to_vec(self)?;
        fs::write(path, json).map_err(|e| WatchError::persist(path, e))
    }
}

impl FromIterator<(PathBuf, FileStat)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (PathBuf, FileStat)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
