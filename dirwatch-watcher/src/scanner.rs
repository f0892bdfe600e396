//! The scanner run loop.
//!
//! A Scanner owns one background thread that repeatedly collects a
//! snapshot, diffs it against the previous one and dispatches the
//! resulting batch. Between cycles it parks on a condition variable
//! until its change source signals.
//!
//! Signals are counted under the same mutex the loop parks on. If any
//! arrive while a cycle is running, the loop goes straight into another
//! cycle instead of parking, and that one cycle absorbs all of them.
//! A signal can therefore never slip in between "nothing pending" and
//! "park", and a burst of N signals costs one rescan, not N.

use crate::collector::SnapshotCollector;
use crate::config::WatchConfig;
use crate::dispatch::{Dispatcher, Listener, ListenerError, ListenerId};
use crate::source::{build_source, ChangeSource};
use dirwatch_core::{diff, Event, Result, Snapshot, StabilityTracker, WatchError};
use parking_lot::{Condvar, Mutex};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct LoopState {
    /// Signals not yet absorbed by a cycle.
    pending: usize,
    stop: bool,
    running: bool,
}

#[derive(Debug, Default)]
struct Coordinator {
    state: Mutex<LoopState>,
    ready: Condvar,
}

/// Wake-up handle given to change sources.
///
/// Cheap to clone and safe to call from any thread.
#[derive(Debug, Clone, Default)]
pub struct Signal {
    inner: Arc<Coordinator>,
}

impl Signal {
    /// Records that something may have changed and wakes the scanner.
    pub fn signal(&self) {
        let mut state = self.inner.state.lock();
        state.pending = state.pending.saturating_add(1);
        self.inner.ready.notify_one();
    }

    /// Signals raised since the scanner last started a cycle.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending
    }
}

/// State carried from one cycle to the next. Only the thread running
/// cycles ever touches it.
#[derive(Debug)]
struct Cycle {
    snapshot: Snapshot,
    stability: Option<StabilityTracker>,
}

impl Cycle {
    fn new(snapshot: Snapshot, stable: Option<u32>) -> Self {
        Self {
            snapshot,
            stability: stable.and_then(|n| StabilityTracker::new(n).ok()),
        }
    }

    /// Collect, diff, swap in the new snapshot, dispatch.
    fn run(&mut self, collector: &SnapshotCollector, dispatcher: &Dispatcher) {
        let start = Instant::now();

        let events = match collector.collect() {
            Ok(current) => {
                let mut events = diff(&self.snapshot, &current);
                self.snapshot = current;
                if let Some(tracker) = self.stability.as_mut() {
                    let stable = tracker.observe(&events);
                    events.extend(stable);
                }
                events
            }
            Err(e) => {
                warn!("Scan failed, keeping previous snapshot: {}", e);
                Vec::new()
            }
        };

        debug!("Cycle found {} events in {:?}", events.len(), start.elapsed());
        dispatcher.dispatch(&events);
    }
}

struct Lifecycle {
    source: Box<dyn ChangeSource>,
    thread: Option<JoinHandle<Cycle>>,
    /// Parked here while stopped; moved into the thread while running.
    cycle: Option<Cycle>,
}

/// Watches directories and notifies listeners of changes.
///
/// # Example
///
/// ```no_run
/// use dirwatch_core::Event;
/// use dirwatch_watcher::{ListenerError, Scanner, WatchConfig};
///
/// let scanner = Scanner::new(WatchConfig::new("./src")).unwrap();
/// scanner.subscribe(|events: &[Event]| -> Result<(), ListenerError> {
///     for event in events {
///         println!("{}", event);
///     }
///     Ok(())
/// });
/// scanner.start().unwrap();
/// // ...
/// scanner.stop();
/// ```
pub struct Scanner {
    coordinator: Arc<Coordinator>,
    collector: Arc<SnapshotCollector>,
    dispatcher: Arc<Dispatcher>,
    lifecycle: Mutex<Lifecycle>,
    stable: Option<u32>,
    persist: Option<PathBuf>,
}

impl Scanner {
    /// Creates a stopped scanner using the change source the config selects.
    pub fn new(config: WatchConfig) -> Result<Self> {
        let config = config.absolutize()?;
        let source = build_source(&config);
        Self::build(config, source)
    }

    /// Creates a stopped scanner driven by a caller-supplied change source.
    pub fn with_source(config: WatchConfig, source: Box<dyn ChangeSource>) -> Result<Self> {
        let config = config.absolutize()?;
        Self::build(config, source)
    }

    fn build(config: WatchConfig, source: Box<dyn ChangeSource>) -> Result<Self> {
        config.validate()?;
        let collector = SnapshotCollector::new(&config)?;
        let snapshot = initial_snapshot(&config, &collector);

        debug!(
            "Scanner for {} root(s) using {} source",
            config.roots.len(),
            source.kind()
        );

        Ok(Self {
            coordinator: Arc::new(Coordinator::default()),
            collector: Arc::new(collector),
            dispatcher: Arc::new(Dispatcher::new()),
            lifecycle: Mutex::new(Lifecycle {
                source,
                thread: None,
                cycle: Some(Cycle::new(snapshot, config.stable)),
            }),
            stable: config.stable,
            persist: config.persist,
        })
    }

    /// Registers a listener. See [`Dispatcher::add`].
    pub fn add_listener(&self, listener: Arc<dyn Listener>) -> ListenerId {
        self.dispatcher.add(listener)
    }

    /// Registers a closure as a listener.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&[Event]) -> std::result::Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.dispatcher.add(Arc::new(listener))
    }

    /// Deregisters a listener. Returns false if it wasn't registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.dispatcher.remove(id)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.collector.roots()
    }

    pub fn is_running(&self) -> bool {
        self.coordinator.state.lock().running
    }

    /// A handle that wakes this scanner, as its change source would.
    pub fn signal_handle(&self) -> Signal {
        Signal {
            inner: self.coordinator.clone(),
        }
    }

    /// Starts the change source and the scanner thread.
    ///
    /// Does nothing if already running. If the change source can't start,
    /// the error is returned and the scanner stays stopped.
    pub fn start(&self) -> Result<()> {
        let mut life = self.lifecycle.lock();
        if life.thread.is_some() {
            return Ok(());
        }

        {
            let mut state = self.coordinator.state.lock();
            state.stop = false;
            state.pending = 0;
        }

        life.source.start(self.signal_handle())?;

        let cycle = life
            .cycle
            .take()
            .unwrap_or_else(|| Cycle::new(Snapshot::new(), self.stable));
        let coordinator = self.coordinator.clone();
        let collector = self.collector.clone();
        let dispatcher = self.dispatcher.clone();

        let spawned = thread::Builder::new()
            .name("dirwatch-scanner".into())
            .spawn(move || run_loop(cycle, &coordinator, &collector, &dispatcher));

        match spawned {
            Ok(handle) => {
                life.thread = Some(handle);
                self.coordinator.state.lock().running = true;
                info!(
                    "Watching {} root(s) ({} source)",
                    self.collector.roots().count(),
                    life.source.kind()
                );
                Ok(())
            }
            Err(e) => {
                life.source.stop();
                Err(WatchError::Spawn(e))
            }
        }
    }

    /// Stops the scanner and waits for its thread to exit.
    ///
    /// Does nothing if not running. Once this returns no listener will be
    /// called again until the next `start`.
    ///
    /// Listeners run on the thread being joined, and the scanner's
    /// lifecycle lock is held for the whole join. A listener must
    /// therefore never call `stop`, `start` or `run_once` on its own
    /// scanner: if a stop is in progress on another thread, that call
    /// blocks on the lock while `stop` waits for the listener, and
    /// neither returns.
    pub fn stop(&self) {
        let mut life = self.lifecycle.lock();
        let Some(handle) = life.thread.take() else {
            return;
        };

        self.coordinator.state.lock().stop = true;
        life.source.stop();
        {
            let _state = self.coordinator.state.lock();
            self.coordinator.ready.notify_all();
        }

        let cycle = self.settle(handle.join());
        life.cycle = Some(cycle);
        self.coordinator.state.lock().running = false;
        info!("Stopped watching");
    }

    /// Takes back the state a finished loop thread returned, persisting it.
    ///
    /// A panicked loop left nothing trustworthy behind, so the persisted
    /// file is left as it was and the next run starts from empty.
    fn settle(&self, joined: thread::Result<Cycle>) -> Cycle {
        let cycle = match joined {
            Ok(cycle) => cycle,
            Err(_) => {
                error!("Scanner thread panicked; starting over from an empty snapshot");
                return Cycle::new(Snapshot::new(), self.stable);
            }
        };

        if let Some(path) = &self.persist {
            match cycle.snapshot.save(path) {
                Ok(()) => debug!("Saved snapshot to {}", path.display()),
                Err(e) => warn!("Failed to save snapshot: {}", e),
            }
        }
        cycle
    }

    /// Runs one cycle on the calling thread. The scanner must be stopped.
    pub fn run_once(&self) -> Result<()> {
        let mut life = self.lifecycle.lock();
        if life.thread.is_some() {
            return Err(WatchError::Running);
        }
        let cycle = life
            .cycle
            .get_or_insert_with(|| Cycle::new(Snapshot::new(), self.stable));
        cycle.run(&self.collector, &self.dispatcher);
        Ok(())
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(
    mut cycle: Cycle,
    coordinator: &Coordinator,
    collector: &SnapshotCollector,
    dispatcher: &Dispatcher,
) -> Cycle {
    debug!("Scanner loop started");

    loop {
        if coordinator.state.lock().stop {
            break;
        }

        cycle.run(collector, dispatcher);

        let mut state = coordinator.state.lock();
        if state.pending > 0 {
            // Signals arrived mid-cycle; one more cycle covers all of them
            state.pending = 0;
            continue;
        }
        coordinator
            .ready
            .wait_while(&mut state, |s| s.pending == 0 && !s.stop);
        state.pending = 0;
    }

    debug!("Scanner loop exited");
    cycle
}

fn initial_snapshot(config: &WatchConfig, collector: &SnapshotCollector) -> Snapshot {
    if let Some(path) = config.persist.as_deref().filter(|p| p.exists()) {
        match Snapshot::load(path) {
            Ok(snapshot) => {
                debug!("Loaded {} entries from {}", snapshot.len(), path.display());
                return snapshot;
            }
            Err(e) => warn!("Ignoring persisted snapshot: {}", e),
        }
    }

    if config.pre_load {
        match collector.collect() {
            Ok(snapshot) => return snapshot,
            Err(e) => warn!("Pre-load failed: {}", e),
        }
    }

    Snapshot::new()
}
