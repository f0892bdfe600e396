//! Snapshot collection.
//!
//! Walks the watched roots and records modification metadata for every
//! entry that passes the configured filters. Entries that vanish or
//! can't be stat'ed mid-walk are left out; the next diff reports them
//! as removed, which is exactly what happened.

use crate::config::WatchConfig;
use dirwatch_core::{FileStat, Result, Snapshot, WatchError};
use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// Enumerates watched roots into snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotCollector {
    roots: Vec<(PathBuf, Override)>,
    max_depth: Option<usize>,
    follow_symlinks: bool,
    skip_hidden: bool,
    git_ignore: bool,
    include_dirs: bool,
}

impl SnapshotCollector {
    /// Compiles the include/exclude globs for each root.
    ///
    /// Fails with [`WatchError::Config`] if a glob doesn't parse.
    pub fn new(config: &WatchConfig) -> Result<Self> {
        let roots = config
            .roots
            .iter()
            .map(|root| Ok((root.clone(), build_overrides(root, config)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            roots,
            max_depth: config.max_depth,
            follow_symlinks: config.follow_symlinks,
            skip_hidden: config.skip_hidden,
            git_ignore: config.git_ignore,
            include_dirs: config.include_dirs,
        })
    }

    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(|(root, _)| root.as_path())
    }

    /// Walks every root and returns what it found.
    ///
    /// A root that is missing, unreadable, or not a directory fails the
    /// whole collection with [`WatchError::Root`].
    pub fn collect(&self) -> Result<Snapshot> {
        let start = Instant::now();
        let mut snapshot = Snapshot::new();

        for (root, overrides) in &self.roots {
            check_root(root)?;

            let walker = WalkBuilder::new(root)
                .standard_filters(false)
                .hidden(self.skip_hidden)
                .git_ignore(self.git_ignore)
                .git_global(self.git_ignore)
                .git_exclude(self.git_ignore)
                .ignore(self.git_ignore)
                .parents(self.git_ignore)
                .require_git(false)
                .follow_links(self.follow_symlinks)
                .max_depth(self.max_depth)
                .overrides(overrides.clone())
                .sort_by_file_name(|a, b| a.cmp(b))
                .build();

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        debug!("Skipping entry: {}", e);
                        continue;
                    }
                };

                // The root itself is never part of the snapshot
                if entry.depth() == 0 {
                    continue;
                }

                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if is_dir && !self.include_dirs {
                    continue;
                }

                let stat = match entry.metadata() {
                    Ok(meta) => FileStat::from_metadata(&meta),
                    Err(e) => {
                        debug!("Failed to stat {}: {}", entry.path().display(), e);
                        None
                    }
                };

                if let Some(stat) = stat {
                    snapshot.insert(entry.into_path(), stat);
                }
            }
        }

        debug!(
            "Collected {} entries in {:?}",
            snapshot.len(),
            start.elapsed()
        );

        Ok(snapshot)
    }
}

fn build_overrides(root: &Path, config: &WatchConfig) -> Result<Override> {
    let mut builder = OverrideBuilder::new(root);
    let invalid = |glob: &str, e: ignore::Error| {
        WatchError::Config(format!("invalid glob '{}': {}", glob, e))
    };

    for glob in &config.include {
        builder.add(glob).map_err(|e| invalid(glob, e))?;
    }
    for glob in &config.exclude {
        // Override globs are whitelists; a leading '!' turns one into an ignore
        let negated = format!("!{}", glob);
        builder.add(&negated).map_err(|e| invalid(glob, e))?;
    }

    builder
        .build()
        .map_err(|e| WatchError::Config(format!("invalid globs: {}", e)))
}

fn check_root(root: &Path) -> Result<()> {
    let meta = fs::metadata(root).map_err(|e| WatchError::root(root, e))?;
    if !meta.is_dir() {
        return Err(WatchError::root(
            root,
            io::Error::new(io::ErrorKind::Other, "not a directory"),
        ));
    }
    fs::read_dir(root).map_err(|e| WatchError::root(root, e))?;
    Ok(())
}
