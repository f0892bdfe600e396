use dirwatch_core::{Event, EventKind, WatchError};
use dirwatch_watcher::{
    available_sources, ChangeSource, ListenerError, Scanner, Signal, SourceKind, WatchConfig,
};
use filetime::{set_file_mtime, FileTime};
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Change source driven by the test through the scanner's signal handle.
#[derive(Default, Clone)]
struct ManualSource {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    fail: bool,
}

impl ChangeSource for ManualSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Polling
    }

    fn start(&mut self, _signal: Signal) -> Result<(), WatchError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(WatchError::Source("notifier unavailable".into()));
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

fn manual_scanner(config: WatchConfig) -> (Scanner, ManualSource) {
    let source = ManualSource::default();
    let scanner = Scanner::with_source(config, Box::new(source.clone())).unwrap();
    (scanner, source)
}

fn recorder(scanner: &Scanner) -> Receiver<Vec<Event>> {
    let (tx, rx) = channel();
    let tx = Mutex::new(tx);
    scanner.subscribe(move |events: &[Event]| -> Result<(), ListenerError> {
        let _ = tx.lock().send(events.to_vec());
        Ok(())
    });
    rx
}

fn counter(scanner: &Scanner) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    scanner.subscribe(move |_: &[Event]| -> Result<(), ListenerError> {
        counted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    calls
}

fn next_batch(rx: &Receiver<Vec<Event>>) -> Vec<Event> {
    rx.recv_timeout(TIMEOUT).expect("no dispatch within timeout")
}

fn next_non_empty(rx: &Receiver<Vec<Event>>) -> Vec<Event> {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if let Ok(batch) = rx.recv_timeout(Duration::from_millis(100)) {
            if !batch.is_empty() {
                return batch;
            }
        }
    }
    panic!("no non-empty batch within timeout");
}

fn saw_event(rx: &Receiver<Vec<Event>>, path: &Path, kind: EventKind) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if let Ok(batch) = rx.recv_timeout(Duration::from_millis(100)) {
            if batch.iter().any(|e| e.path == path && e.kind == kind) {
                return true;
            }
        }
    }
    false
}

fn wait_for(calls: &AtomicUsize, target: usize) {
    let deadline = Instant::now() + TIMEOUT;
    while calls.load(Ordering::SeqCst) < target {
        assert!(Instant::now() < deadline, "listener never reached {} calls", target);
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_add_modify_remove_scenario() {
    let dir = tempdir().unwrap();
    let (scanner, _source) = manual_scanner(WatchConfig::new(dir.path()));
    let rx = recorder(&scanner);
    let signal = scanner.signal_handle();

    scanner.start().unwrap();
    assert!(next_batch(&rx).is_empty());

    let file = dir.path().join("a.txt");
    fs::write(&file, "one").unwrap();
    set_file_mtime(&file, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    signal.signal();
    assert_eq!(next_batch(&rx), vec![Event::added(&file)]);

    fs::write(&file, "two").unwrap();
    set_file_mtime(&file, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
    signal.signal();
    assert_eq!(next_batch(&rx), vec![Event::modified(&file)]);

    fs::remove_file(&file).unwrap();
    signal.signal();
    assert_eq!(next_batch(&rx), vec![Event::removed(&file)]);

    scanner.stop();
}

#[test]
fn test_start_twice_starts_source_once() {
    let dir = tempdir().unwrap();
    let (scanner, source) = manual_scanner(WatchConfig::new(dir.path()));

    scanner.start().unwrap();
    scanner.start().unwrap();
    assert!(scanner.is_running());
    assert_eq!(source.starts.load(Ordering::SeqCst), 1);

    scanner.stop();
    scanner.stop();
    assert!(!scanner.is_running());
    assert_eq!(source.stops.load(Ordering::SeqCst), 1);

    scanner.start().unwrap();
    assert_eq!(source.starts.load(Ordering::SeqCst), 2);
    scanner.stop();
}

#[test]
fn test_burst_during_scan_costs_one_cycle() {
    let dir = tempdir().unwrap();
    let (scanner, _source) = manual_scanner(WatchConfig::new(dir.path()));
    let signal = scanner.signal_handle();

    let (entered_tx, entered_rx) = channel::<()>();
    let (gate_tx, gate_rx) = channel::<()>();
    let entered_tx = Mutex::new(entered_tx);
    let gate_rx = Mutex::new(gate_rx);
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = calls.clone();
        scanner.subscribe(move |_: &[Event]| -> Result<(), ListenerError> {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                // Hold the first cycle open until the burst is in
                let _ = entered_tx.lock().send(());
                let _ = gate_rx.lock().recv_timeout(TIMEOUT);
            }
            Ok(())
        });
    }

    scanner.start().unwrap();
    entered_rx.recv_timeout(TIMEOUT).unwrap();
    for _ in 0..50 {
        signal.signal();
    }
    gate_tx.send(()).unwrap();

    wait_for(&calls, 2);
    thread::sleep(Duration::from_millis(300));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(signal.pending(), 0);

    scanner.stop();
}

#[test]
fn test_no_signal_is_lost() {
    let dir = tempdir().unwrap();
    let (scanner, _source) = manual_scanner(WatchConfig::new(dir.path()));
    let calls = counter(&scanner);
    let signal = scanner.signal_handle();

    scanner.start().unwrap();
    wait_for(&calls, 1);

    // Each signal lands at an arbitrary point relative to the loop's
    // park decision; every one must still produce a cycle.
    for i in 0..200 {
        signal.signal();
        wait_for(&calls, i + 2);
    }

    scanner.stop();
}

#[test]
fn test_no_dispatch_after_stop() {
    let dir = tempdir().unwrap();
    let (scanner, _source) = manual_scanner(WatchConfig::new(dir.path()));
    let calls = counter(&scanner);
    let signal = scanner.signal_handle();

    let keep_going = Arc::new(AtomicBool::new(true));
    let spammer = {
        let keep_going = keep_going.clone();
        let signal = signal.clone();
        thread::spawn(move || {
            while keep_going.load(Ordering::SeqCst) {
                signal.signal();
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    scanner.start().unwrap();
    wait_for(&calls, 5);
    scanner.stop();

    let after_stop = calls.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(200));
    assert_eq!(calls.load(Ordering::SeqCst), after_stop);

    keep_going.store(false, Ordering::SeqCst);
    spammer.join().unwrap();
}

#[test]
fn test_source_failure_leaves_scanner_stopped() {
    let dir = tempdir().unwrap();
    let source = ManualSource {
        fail: true,
        ..ManualSource::default()
    };
    let scanner = Scanner::with_source(WatchConfig::new(dir.path()), Box::new(source)).unwrap();
    let calls = counter(&scanner);

    let err = scanner.start().unwrap_err();
    assert!(matches!(err, WatchError::Source(_)));
    assert!(!scanner.is_running());

    thread::sleep(Duration::from_millis(100));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // still usable synchronously
    scanner.run_once().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_run_once_requires_stopped_scanner() {
    let dir = tempdir().unwrap();
    let (scanner, _source) = manual_scanner(WatchConfig::new(dir.path()));

    scanner.start().unwrap();
    assert!(matches!(scanner.run_once(), Err(WatchError::Running)));
    scanner.stop();
    assert!(scanner.run_once().is_ok());
}

#[test]
fn test_missing_root_dispatches_empty_batches() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("later");
    let (scanner, _source) = manual_scanner(WatchConfig::new(&root));
    let rx = recorder(&scanner);
    let signal = scanner.signal_handle();

    scanner.start().unwrap();
    assert!(next_batch(&rx).is_empty());
    signal.signal();
    assert!(next_batch(&rx).is_empty());

    fs::create_dir(&root).unwrap();
    fs::write(root.join("a.txt"), "").unwrap();
    signal.signal();
    assert_eq!(next_batch(&rx), vec![Event::added(root.join("a.txt"))]);

    scanner.stop();
}

#[test]
fn test_failing_listener_does_not_stop_the_loop() {
    let dir = tempdir().unwrap();
    let (scanner, _source) = manual_scanner(WatchConfig::new(dir.path()));
    scanner.subscribe(|_: &[Event]| -> Result<(), ListenerError> { panic!("bad listener") });
    scanner.subscribe(|_: &[Event]| -> Result<(), ListenerError> { Err("nope".into()) });
    let calls = counter(&scanner);
    let signal = scanner.signal_handle();

    scanner.start().unwrap();
    wait_for(&calls, 1);
    signal.signal();
    wait_for(&calls, 2);
    scanner.stop();
}

#[test]
fn test_unsubscribed_listener_is_not_called() {
    let dir = tempdir().unwrap();
    let (scanner, _source) = manual_scanner(WatchConfig::new(dir.path()));
    let kept = counter(&scanner);
    let dropped = Arc::new(AtomicUsize::new(0));
    let id = {
        let dropped = dropped.clone();
        scanner.subscribe(move |_: &[Event]| -> Result<(), ListenerError> {
            dropped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };

    scanner.run_once().unwrap();
    assert!(scanner.unsubscribe(id));
    scanner.run_once().unwrap();

    assert_eq!(kept.load(Ordering::SeqCst), 2);
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
}

#[test]
fn test_pre_load_hides_existing_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("old.txt"), "").unwrap();

    let (scanner, _source) = manual_scanner(WatchConfig::new(dir.path()).with_pre_load(true));
    let rx = recorder(&scanner);
    scanner.run_once().unwrap();
    assert!(next_batch(&rx).is_empty());

    let (scanner, _source) = manual_scanner(WatchConfig::new(dir.path()));
    let rx = recorder(&scanner);
    scanner.run_once().unwrap();
    assert_eq!(next_batch(&rx), vec![Event::added(dir.path().join("old.txt"))]);
}

#[test]
fn test_stable_events() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("upload.bin");
    fs::write(&file, "data").unwrap();

    let (scanner, _source) = manual_scanner(WatchConfig::new(dir.path()).with_stable(1));
    let rx = recorder(&scanner);

    scanner.run_once().unwrap();
    assert_eq!(next_batch(&rx), vec![Event::added(&file)]);
    scanner.run_once().unwrap();
    assert_eq!(next_batch(&rx), vec![Event::stable(&file)]);
    scanner.run_once().unwrap();
    assert!(next_batch(&rx).is_empty());
}

#[test]
fn test_persisted_snapshot_reports_offline_changes() {
    let dir = tempdir().unwrap();
    let state = tempdir().unwrap();
    let persist = state.path().join("snapshot.json");
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, "").unwrap();

    {
        let config = WatchConfig::new(dir.path()).with_persist(&persist);
        let (scanner, _source) = manual_scanner(config);
        let rx = recorder(&scanner);
        scanner.start().unwrap();
        assert_eq!(next_batch(&rx), vec![Event::added(&a)]);
        scanner.stop();
    }
    assert!(persist.exists());

    fs::remove_file(&a).unwrap();
    fs::write(&b, "").unwrap();

    let config = WatchConfig::new(dir.path()).with_persist(&persist);
    let (scanner, _source) = manual_scanner(config);
    let rx = recorder(&scanner);
    scanner.run_once().unwrap();
    assert_eq!(next_batch(&rx), vec![Event::added(&b), Event::removed(&a)]);
}

#[test]
fn test_polling_source_end_to_end() {
    let dir = tempdir().unwrap();
    let config = WatchConfig::new(dir.path())
        .with_source(SourceKind::Polling)
        .with_interval(Duration::from_millis(20));
    let scanner = Scanner::new(config).unwrap();
    let rx = recorder(&scanner);

    scanner.start().unwrap();
    assert!(next_batch(&rx).is_empty());

    let file = dir.path().join("polled.txt");
    fs::write(&file, "x").unwrap();
    let batch = next_non_empty(&rx);
    assert_eq!(batch, vec![Event::added(&file)]);

    scanner.stop();
}

#[test]
fn test_native_source_end_to_end() {
    if !available_sources().contains(&SourceKind::Native) {
        return;
    }

    let dir = tempdir().unwrap();
    let config = WatchConfig::new(dir.path()).with_source(SourceKind::Native);
    let scanner = Scanner::new(config).unwrap();
    let rx = recorder(&scanner);

    scanner.start().unwrap();
    assert!(next_batch(&rx).is_empty());

    let file = dir.path().join("native.txt");
    fs::write(&file, "x").unwrap();
    let batch = next_non_empty(&rx);
    assert!(batch
        .iter()
        .any(|e| e.path == file && e.kind == EventKind::Added));

    scanner.stop();
}

#[test]
fn test_native_source_waits_for_missing_root() {
    if !available_sources().contains(&SourceKind::Native) {
        return;
    }

    let dir = tempdir().unwrap();
    let root = dir.path().join("later");
    let config = WatchConfig::new(&root).with_source(SourceKind::Native);
    let scanner = Scanner::new(config).unwrap();
    let rx = recorder(&scanner);

    scanner.start().unwrap();
    assert!(scanner.is_running());
    assert!(next_batch(&rx).is_empty());

    fs::create_dir(&root).unwrap();
    let file = root.join("a.txt");
    fs::write(&file, "x").unwrap();
    assert!(saw_event(&rx, &file, EventKind::Added));

    scanner.stop();
}

#[test]
fn test_native_source_survives_root_recreation() {
    if !available_sources().contains(&SourceKind::Native) {
        return;
    }

    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    fs::create_dir(&root).unwrap();
    let config = WatchConfig::new(&root).with_source(SourceKind::Native);
    let scanner = Scanner::new(config).unwrap();
    let rx = recorder(&scanner);

    scanner.start().unwrap();
    assert!(next_batch(&rx).is_empty());

    fs::remove_dir(&root).unwrap();
    fs::create_dir(&root).unwrap();
    let file = root.join("a.txt");
    fs::write(&file, "x").unwrap();
    assert!(saw_event(&rx, &file, EventKind::Added));

    // And the new directory stays watched
    let later = root.join("b.txt");
    thread::sleep(Duration::from_millis(50));
    fs::write(&later, "y").unwrap();
    assert!(saw_event(&rx, &later, EventKind::Added));

    scanner.stop();
}
