//! Interval-driven change source.

use super::ChangeSource;
use crate::config::SourceKind;
use crate::scanner::Signal;
use dirwatch_core::{Result, WatchError};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Signals the scanner once every `interval`.
pub struct PollingSource {
    interval: Duration,
    ticker: Option<(Sender<()>, JoinHandle<()>)>,
}

impl PollingSource {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ticker: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl ChangeSource for PollingSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Polling
    }

    fn start(&mut self, signal: Signal) -> Result<()> {
        if self.ticker.is_some() {
            return Ok(());
        }

        // Dropping the sender is the stop request
        let (tx, rx) = channel::<()>();
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name("dirwatch-poll".into())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => signal.signal(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| WatchError::Source(format!("failed to spawn poll timer: {}", e)))?;

        debug!("Polling every {:?}", interval);
        self.ticker = Some((tx, handle));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some((tx, handle)) = self.ticker.take() {
            drop(tx);
            if handle.join().is_err() {
                warn!("Poll timer thread panicked");
            }
        }
    }
}

impl Drop for PollingSource {
    fn drop(&mut self) {
        self.stop();
    }
}
