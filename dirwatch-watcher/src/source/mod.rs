//! Change sources.
//!
//! A change source decides *when* the scanner looks at the disk, never
//! *what* changed. Both built-in sources do nothing but call
//! [`Signal::signal`]; the scan and diff that follow are the source of
//! truth.

mod native;
mod polling;

pub use native::NativeSource;
pub use polling::PollingSource;

use crate::config::{SourceKind, WatchConfig};
use crate::scanner::Signal;
use dirwatch_core::Result;
use notify::RecursiveMode;
use once_cell::sync::Lazy;
use tracing::debug;

/// Something that wakes the scanner.
///
/// The scanner calls `start` once per run and `stop` once when the run
/// ends, both from the thread driving the scanner's lifecycle.
pub trait ChangeSource: Send {
    /// Which variant this is, for logging.
    fn kind(&self) -> SourceKind;

    /// Begins listening. Must not block; any listening work belongs on
    /// the source's own thread. Startup failures are returned here.
    fn start(&mut self, signal: Signal) -> Result<()>;

    /// Stops listening. After this returns the source must not signal.
    fn stop(&mut self);
}

static NATIVE_AVAILABLE: Lazy<bool> = Lazy::new(|| {
    // notify falls back to polling on platforms without a native API
    if !cfg!(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "windows",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly",
    )) {
        return false;
    }

    match notify::recommended_watcher(|_: notify::Result<notify::Event>| {}) {
        Ok(_) => true,
        Err(e) => {
            debug!("Native notifications unavailable: {}", e);
            false
        }
    }
});

/// Lists the change sources usable on this machine.
///
/// Polling is always available. The native probe runs once per process.
pub fn available_sources() -> Vec<SourceKind> {
    let mut sources = vec![SourceKind::Polling];
    if *NATIVE_AVAILABLE {
        sources.push(SourceKind::Native);
    }
    sources
}

impl SourceKind {
    /// Turns `Auto` into a concrete variant using the capability probe.
    pub fn resolve(self) -> SourceKind {
        match self {
            SourceKind::Auto if *NATIVE_AVAILABLE => SourceKind::Native,
            SourceKind::Auto => SourceKind::Polling,
            other => other,
        }
    }
}

/// Builds the change source selected by `config`.
pub fn build_source(config: &WatchConfig) -> Box<dyn ChangeSource> {
    match config.source.resolve() {
        SourceKind::Native => {
            let mode = if config.max_depth == Some(1) {
                RecursiveMode::NonRecursive
            } else {
                RecursiveMode::Recursive
            };
            Box::new(NativeSource::new(config.roots.clone(), mode))
        }
        _ => Box::new(PollingSource::new(config.interval())),
    }
}
