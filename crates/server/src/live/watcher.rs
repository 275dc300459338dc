//! Recursive change watcher for session record files.
//!
//! Watches the projects root for create/modify events on `.jsonl` files and
//! invokes a callback once per path after that path has been quiet for the
//! debounce interval.
//!
//! ```text
//! notify thread ──try_send──▶ mpsc ──▶ debouncer task (DelayQueue, one key per path) ──▶ callback
//! ```
//!
//! Bursts on the same path collapse into one callback. Distinct paths are
//! never coalesced with each other: each fires its own callback.
//!
//! A root that does not exist yet is not an error. The watcher starts idle
//! and [`SessionWatcher::rearm`] attaches it once the directory shows up.

use co11y_core::RECORD_EXTENSION;
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::time::delay_queue::{DelayQueue, Key};
use tracing::{error, info, warn};

use crate::metrics;

/// Invoked with the changed file path once its debounce window elapses.
pub type ChangeCallback = Arc<dyn Fn(PathBuf) + Send + Sync>;

/// Raw events buffered between the notify thread and the debouncer.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Handle to a running watcher. Closing (or dropping) it stops all callbacks.
pub struct SessionWatcher {
    watcher: Option<RecommendedWatcher>,
    root: PathBuf,
    armed: bool,
    cancel: CancellationToken,
}

impl SessionWatcher {
    /// Start watching `root` recursively. Must be called inside a tokio runtime.
    ///
    /// If `root` does not exist yet, logs a warning and returns an idle
    /// watcher; call [`rearm`](Self::rearm) later to attach it.
    pub fn start(root: &Path, debounce: Duration, callback: ChangeCallback) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel::<PathBuf>(EVENT_CHANNEL_CAPACITY);
        let dropped = AtomicU64::new(0);

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for path in event.paths {
                        if !is_record_change(&event.kind, &path) {
                            continue;
                        }
                        if tx.try_send(path).is_err() {
                            metrics::record_watcher_event_dropped();
                            let count = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                            if count == 1 || count % 100 == 0 {
                                warn!(
                                    dropped_total = count,
                                    "File watcher channel full, event dropped (periodic snapshot will catch up)"
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("File watcher error: {}", e);
                }
            })?;

        let cancel = CancellationToken::new();
        spawn_debouncer(rx, debounce, cancel.clone(), callback);

        let mut this = Self {
            watcher: Some(watcher),
            root: root.to_path_buf(),
            armed: false,
            cancel,
        };
        if !this.rearm()? {
            warn!(
                "Projects directory does not exist: {}; file watcher idle until it appears",
                root.display()
            );
        }
        Ok(this)
    }

    /// Attach to the root if it was missing so far. Returns `true` once the
    /// root is being watched. A closed watcher never rearms.
    pub fn rearm(&mut self) -> notify::Result<bool> {
        let Some(watcher) = self.watcher.as_mut() else {
            return Ok(false);
        };
        if self.armed {
            return Ok(true);
        }
        if !self.root.is_dir() {
            return Ok(false);
        }
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        self.armed = true;
        info!(root = %self.root.display(), "Watching for record file changes");
        Ok(true)
    }

    /// Stop watching. Idempotent; no callback fires after this returns,
    /// except one that was already executing.
    pub fn close(&mut self) {
        self.cancel.cancel();
        if self.watcher.take().is_some() {
            info!("File watcher closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.armed
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Create, or content/name modification, of a record file.
pub fn is_record_change(kind: &EventKind, path: &Path) -> bool {
    let relevant_kind = match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    };
    relevant_kind && path.extension().is_some_and(|ext| ext == RECORD_EXTENSION)
}

/// Per-path debounce loop.
///
/// Each incoming path (re)arms its own timer; the callback runs when a timer
/// expires. Ends when `cancel` fires or the sender side is dropped, dropping
/// every pending timer.
pub fn spawn_debouncer(
    mut rx: mpsc::Receiver<PathBuf>,
    quiet: Duration,
    cancel: CancellationToken,
    callback: ChangeCallback,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timers: DelayQueue<PathBuf> = DelayQueue::new();
        let mut keys: HashMap<PathBuf, Key> = HashMap::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(path) => match keys.get(&path) {
                        Some(key) => timers.reset(key, quiet),
                        None => {
                            let key = timers.insert(path.clone(), quiet);
                            keys.insert(path, key);
                        }
                    },
                    None => break,
                },
                Some(expired) = std::future::poll_fn(|cx| timers.poll_expired(cx)) => {
                    let path = expired.into_inner();
                    keys.remove(&path);
                    if cancel.is_cancelled() {
                        break;
                    }
                    callback(path);
                }
            }
        }
    })
}
