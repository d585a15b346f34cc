//! Cross-process change detection.
//!
//! Another `planr` process committing to the same namespace replaces
//! `tasks.json` / `routines.json`. A notify watcher on the namespace
//! directory coalesces those events and calls [`Store::refresh`], which
//! republishes the live feeds when a revision moved.

use std::path::Path;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::store::Store;

enum Msg {
    Fs(notify::Result<notify::Event>),
    Stop,
}

/// Running watcher thread; stops on drop.
pub struct WatchHandle {
    tx: mpsc::Sender<Msg>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.tx.send(Msg::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn touches_collection(storage: &Storage, event: &notify::Event) -> bool {
    event.paths.is_empty()
        || event
            .paths
            .iter()
            .any(|path| storage.is_collection_file(path))
}

/// Watch the store's namespace and refresh its feeds after changes settle
/// for `debounce_ms`.
pub fn spawn_watch(store: Store, debounce_ms: u64) -> Result<WatchHandle> {
    store.ensure_ready()?;
    let dir = store.storage().namespace_dir().to_path_buf();

    let (tx, rx) = mpsc::channel();
    let fs_tx = tx.clone();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
        let _ = fs_tx.send(Msg::Fs(res));
    })
    .map_err(|err| Error::StoreUnavailable(format!("cannot watch store: {err}")))?;
    watcher
        .watch(Path::new(&dir), RecursiveMode::NonRecursive)
        .map_err(|err| Error::StoreUnavailable(format!("cannot watch {}: {err}", dir.display())))?;

    let thread = thread::spawn(move || {
        // Keep the watcher alive for the lifetime of the thread.
        let _watcher = watcher;
        let debounce = Duration::from_millis(debounce_ms);
        let mut pending: Option<Instant> = None;

        loop {
            let timeout = pending
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::from_secs(3600));
            match rx.recv_timeout(timeout) {
                Ok(Msg::Fs(Ok(event))) => {
                    if touches_collection(store.storage(), &event) {
                        pending = Some(Instant::now() + debounce);
                    }
                }
                Ok(Msg::Fs(Err(err))) => {
                    warn!(error = %err, "store watcher error");
                }
                Ok(Msg::Stop) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if pending.take().is_some() {
                        match store.refresh() {
                            Ok(true) => debug!("external change picked up"),
                            Ok(false) => {}
                            Err(err) => warn!(error = %err, "refresh after change failed"),
                        }
                    }
                }
            }
        }
    });

    Ok(WatchHandle {
        tx,
        thread: Some(thread),
    })
}
