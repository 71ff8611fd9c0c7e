//! Filesystem watching and periodic re-indexing.
//!
//! A notify watcher observes the repository roots for `*.jar`/`*.pom`
//! files and directory churn. Bursts of events are debounced behind a
//! quiet window before one `index()` fires; an hourly timer triggers the
//! same single-flight pass. Dropping the handle stops both threads.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::JardexError;
use crate::indexer::Indexer;

/// Writes are awaited for this long before a burst fires one reindex.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

/// Periodic full pass, independent of filesystem events.
pub const PERIODIC_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug)]
pub struct WatchHandle {
    watcher: Option<RecommendedWatcher>,
    timer_stop: Option<Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // The watcher owns the event sender; it must go away first or the
        // debounce thread never sees the disconnect.
        self.watcher.take();
        self.timer_stop.take();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start watching `roots` and firing debounced reindex passes on the
/// given indexer. Refuses to start when no root exists.
pub fn start(indexer: Arc<Indexer>, roots: &[PathBuf]) -> Result<WatchHandle, JardexError> {
    start_with(indexer, roots, DEBOUNCE_WINDOW, PERIODIC_INTERVAL)
}

pub fn start_with(
    indexer: Arc<Indexer>,
    roots: &[PathBuf],
    debounce: Duration,
    periodic: Duration,
) -> Result<WatchHandle, JardexError> {
    let existing: Vec<&PathBuf> = roots.iter().filter(|r| r.is_dir()).collect();
    if existing.is_empty() {
        return Err(JardexError::Configuration(
            "no repository root exists, refusing to start the watcher".to_string(),
        ));
    }

    let (event_tx, event_rx) = mpsc::channel::<()>();
    let mut watcher =
        notify::recommended_watcher(move |result: Result<Event, notify::Error>| match result {
            Ok(event) => {
                if is_relevant(&event) {
                    let _ = event_tx.send(());
                }
            }
            Err(e) => warn!(error = %e, "watch error"),
        })
        .map_err(|e| JardexError::Configuration(format!("failed to create watcher: {e}")))?;

    for root in &existing {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| {
                JardexError::Configuration(format!("failed to watch {}: {e}", root.display()))
            })?;
        info!(root = %root.display(), "watching for archive changes");
    }

    let debouncer = {
        let indexer = Arc::clone(&indexer);
        std::thread::spawn(move || {
            debounce_loop(event_rx, debounce, move || {
                if let Err(e) = indexer.index() {
                    warn!(error = %e, "debounced reindex failed");
                }
            })
        })
    };

    let (timer_tx, timer_rx) = mpsc::channel::<()>();
    let timer = {
        let indexer = Arc::clone(&indexer);
        std::thread::spawn(move || {
            loop {
                match timer_rx.recv_timeout(periodic) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        debug!("periodic reindex");
                        if let Err(e) = indexer.index() {
                            warn!(error = %e, "periodic reindex failed");
                        }
                    }
                }
            }
        })
    };

    Ok(WatchHandle {
        watcher: Some(watcher),
        timer_stop: Some(timer_tx),
        threads: vec![debouncer, timer],
    })
}

/// Coalesce event bursts: after the first event, wait until the stream
/// has been quiet for the full window, then fire once. Exits when the
/// event source disconnects.
fn debounce_loop(events: Receiver<()>, window: Duration, mut fire: impl FnMut()) {
    while events.recv().is_ok() {
        loop {
            match events.recv_timeout(window) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    fire();
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}

/// Only archive and descriptor churn should trigger a reindex: `*.jar`
/// and `*.pom` files, plus directory creation/removal (renames included,
/// since a moved version directory surfaces as one).
fn is_relevant(event: &Event) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    event.paths.iter().any(|p| is_relevant_path(p))
}

fn is_relevant_path(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jar") | Some("pom") => true,
        // Extensionless paths are directory-shaped; removed directories
        // cannot be stat-ed, so the name is all there is to go on. A
        // dotted version directory like `1.0.0` looks like it has the
        // extension `0`.
        None => true,
        Some(ext) if ext.chars().all(|c| c.is_ascii_digit()) => true,
        Some(_) => path.is_dir(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn burst_of_events_fires_exactly_once() {
        let (tx, rx) = mpsc::channel();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);

        let handle = std::thread::spawn(move || {
            debounce_loop(rx, Duration::from_millis(100), move || {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            })
        });

        for _ in 0..10 {
            tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(5));
        }
        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        drop(tx);
        handle.join().unwrap();
    }

    #[test]
    fn separated_bursts_fire_separately() {
        let (tx, rx) = mpsc::channel();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);

        let handle = std::thread::spawn(move || {
            debounce_loop(rx, Duration::from_millis(50), move || {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            })
        });

        tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        drop(tx);
        handle.join().unwrap();
    }

    #[test]
    fn relevance_filter_keeps_archives_and_directories() {
        assert!(is_relevant_path(Path::new("/repo/com/test/demo-1.0.jar")));
        assert!(is_relevant_path(Path::new("/repo/com/test/demo-1.0.pom")));
        assert!(is_relevant_path(Path::new("/repo/com/test/1.0.0")));
        assert!(!is_relevant_path(Path::new("/repo/com/test/notes.txt")));
        assert!(!is_relevant_path(Path::new(
            "/repo/com/test/demo-1.0.jar.sha1"
        )));
    }

    #[test]
    fn watcher_refuses_missing_roots() {
        let missing = PathBuf::from("/definitely/not/a/real/root");
        let store = Arc::new(
            crate::store::Store::open(
                std::env::temp_dir().join(format!(
                    "jardex_watch_{}_{}.db",
                    std::process::id(),
                    std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap()
                        .as_nanos()
                )),
            )
            .unwrap(),
        );
        let config = crate::config::Config {
            maven_repo: Some(missing.clone()),
            gradle_repo: None,
            included_packages: Vec::new(),
            decompiler_path: None,
            version_strategy: crate::resolver::VersionStrategy::default(),
            store_path: store.path().to_path_buf(),
            javap_tool: None,
        };
        let indexer = Indexer::new(store, config);
        let err = start(indexer, &[missing]).unwrap_err();
        assert!(matches!(err, JardexError::Configuration(_)));
    }
}
