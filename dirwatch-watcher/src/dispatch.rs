//! Listener registration and batch dispatch.
//!
//! Listeners are called synchronously on the scanner thread, in the
//! order they were registered, once per cycle with the whole batch. A
//! listener that fails (by error or by panic) is logged and skipped;
//! the rest still run and the scanner keeps going.

use dirwatch_core::Event;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// Error type listeners may return.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives the batch produced by each scan cycle.
pub trait Listener: Send + Sync {
    fn on_events(&self, events: &[Event]) -> Result<(), ListenerError>;
}

impl<F> Listener for F
where
    F: Fn(&[Event]) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_events(&self, events: &[Event]) -> Result<(), ListenerError> {
        self(events)
    }
}

/// Handle returned by registration, used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered set of listeners.
#[derive(Default)]
pub struct Dispatcher {
    listeners: Mutex<Vec<(ListenerId, Arc<dyn Listener>)>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener behind the ones already present.
    pub fn add(&self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Removes a listener. Returns false if `id` wasn't registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Hands `events` to every listener. Returns how many failed.
    ///
    /// The registry lock is released before any listener runs, so a
    /// listener may register or remove listeners; that takes effect on
    /// the next dispatch.
    pub fn dispatch(&self, events: &[Event]) -> usize {
        let listeners: Vec<_> = self.listeners.lock().clone();
        let mut failures = 0;

        for (id, listener) in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_events(events))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!("Listener {} failed: {}", id.0, e);
                }
                Err(_) => {
                    failures += 1;
                    error!("Listener {} panicked", id.0);
                }
            }
        }

        failures
    }
}
