//! Watcher configuration.
//!
//! Everything here is consumed once, when a [`Scanner`](crate::Scanner)
//! is built. All fields have defaults so a partial JSON file loads.

use dirwatch_core::{Result, WatchError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default polling interval, in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 250;

/// Which change source wakes the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Native notifications when the platform has them, polling otherwise.
    #[default]
    Auto,
    /// Wake on a fixed interval.
    Polling,
    /// Wake when the OS reports activity.
    Native,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Auto => "auto",
            Self::Polling => "polling",
            Self::Native => "native",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for SourceKind {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "polling" | "poll" => Ok(Self::Polling),
            "native" => Ok(Self::Native),
            other => Err(WatchError::Config(format!("unknown source '{}'", other))),
        }
    }
}

/// Options for a directory watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directories to watch.
    pub roots: Vec<PathBuf>,

    /// Polling interval in milliseconds. Ignored by the native source.
    pub interval_ms: u64,

    /// Gitignore-style globs a file must match to be recorded.
    /// Empty means every file.
    pub include: Vec<String>,

    /// Gitignore-style globs that are never recorded.
    pub exclude: Vec<String>,

    /// How deep to descend. `Some(1)` records only direct children.
    pub max_depth: Option<usize>,

    /// Change source variant.
    pub source: SourceKind,

    /// Follow symbolic links when walking.
    pub follow_symlinks: bool,

    /// Skip dotfiles and dot-directories.
    pub skip_hidden: bool,

    /// Respect .gitignore, .ignore and git exclude files.
    pub git_ignore: bool,

    /// Record directories as well as files.
    pub include_dirs: bool,

    /// Take the baseline snapshot up front so files that already exist
    /// are not reported as added by the first cycle.
    pub pre_load: bool,

    /// Report a path as stable after this many quiet cycles.
    pub stable: Option<u32>,

    /// Load the prior snapshot from here on construction, save it on stop.
    pub persist: Option<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            interval_ms: DEFAULT_INTERVAL_MS,
            include: Vec::new(),
            exclude: Vec::new(),
            max_depth: None,
            source: SourceKind::Auto,
            follow_symlinks: false,
            skip_hidden: false,
            git_ignore: false,
            include_dirs: false,
            pre_load: false,
            stable: None,
            persist: None,
        }
    }
}

impl WatchConfig {
    /// Creates a config watching a single root with default options.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
            ..Self::default()
        }
    }

    /// Reads a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| WatchError::persist(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_include(mut self, glob: impl Into<String>) -> Self {
        self.include.push(glob.into());
        self
    }

    pub fn with_exclude(mut self, glob: impl Into<String>) -> Self {
        self.exclude.push(glob.into());
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_source(mut self, source: SourceKind) -> Self {
        self.source = source;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    pub fn with_git_ignore(mut self, respect: bool) -> Self {
        self.git_ignore = respect;
        self
    }

    pub fn with_include_dirs(mut self, include: bool) -> Self {
        self.include_dirs = include;
        self
    }

    pub fn with_pre_load(mut self, pre_load: bool) -> Self {
        self.pre_load = pre_load;
        self
    }

    pub fn with_stable(mut self, cycles: u32) -> Self {
        self.stable = Some(cycles);
        self
    }

    pub fn with_persist(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist = Some(path.into());
        self
    }

    /// Resolves relative roots against the current directory.
    pub fn absolutize(mut self) -> Result<Self> {
        if self.roots.iter().any(|r| r.is_relative()) {
            let cwd = std::env::current_dir().map_err(|e| WatchError::root(".", e))?;
            for root in &mut self.roots {
                if root.is_relative() {
                    *root = cwd.join(&*root);
                }
            }
        }
        Ok(self)
    }

    /// Checks the options that can be rejected without touching the disk.
    pub fn validate(&self) -> Result<()> {
        if self.roots.is_empty() {
            return Err(WatchError::Config("no roots to watch".to_string()));
        }
        if self.interval_ms == 0 {
            return Err(WatchError::Config(
                "polling interval must be positive".to_string(),
            ));
        }
        if self.stable == Some(0) {
            return Err(WatchError::Config(
                "stable count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
