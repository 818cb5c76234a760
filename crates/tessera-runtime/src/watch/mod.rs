// Copyright 2025 the Tessera authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Background discovery of module manifests under a watched root.
//!
//! Each watcher runs a dedicated thread that blocks on a wake signal and
//! performs one full scan per wake: new manifests raise [`WatchEvent::Found`],
//! vanished ones [`WatchEvent::Removed`], and manifests whose surrounding
//! directory tree was written to since the last scan raise
//! [`WatchEvent::Changed`]. The directory-level timestamp check matters
//! because the manifest file itself is typically static while the module's
//! other artifacts get re-exported.
//!
//! The wake signal is a one-slot channel: a refresh requested while a scan is
//! in progress stays pending instead of being dropped, so no wakeup is ever
//! lost.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tessera_core::manifest::MANIFEST_EXTENSION;
use thiserror::Error;

/// A raw file-level discovery event for one manifest path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A manifest not seen before.
    Found(PathBuf),
    /// A known manifest whose module directory was written to.
    Changed(PathBuf),
    /// A known manifest that is no longer on disk.
    Removed(PathBuf),
}

impl WatchEvent {
    /// The manifest path the event refers to.
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Found(p) | WatchEvent::Changed(p) | WatchEvent::Removed(p) => p,
        }
    }
}

/// An error raised when a watch root cannot be monitored.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watch root does not exist or is not a directory.
    #[error("watch root '{path}' is not a directory")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },
    /// The watch root could not be resolved.
    #[error("failed to resolve watch root '{path}'")]
    Io {
        /// The offending path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Configuration for a [`DirectoryWatcher`].
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// The file extension manifests are discovered by, without the dot.
    pub manifest_extension: String,
    /// Maximum directory depth to walk below the root.
    pub max_depth: usize,
    /// When set, the watcher rescans on this interval in addition to
    /// explicit refreshes.
    pub poll_interval: Option<Duration>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            manifest_extension: MANIFEST_EXTENSION.to_string(),
            max_depth: 8,
            poll_interval: None,
        }
    }
}

/// A directory monitored for module manifests on a dedicated background
/// thread.
pub struct DirectoryWatcher {
    path: PathBuf,
    refresh_tx: Sender<()>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DirectoryWatcher {
    /// Spawns a watcher over `root`, publishing events into `events`.
    ///
    /// The watcher performs no scan until the first [`Self::refresh`] (or,
    /// with a poll interval configured, the first timer expiry).
    ///
    /// # Errors
    /// Fails when `root` cannot be resolved to an existing directory.
    pub fn spawn(
        root: &Path,
        config: WatchConfig,
        events: flume::Sender<WatchEvent>,
    ) -> Result<Self, WatchError> {
        let path = root.canonicalize().map_err(|source| WatchError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        if !path.is_dir() {
            return Err(WatchError::NotADirectory { path });
        }

        // One slot: a refresh requested mid-scan stays pending rather than
        // being dropped, and redundant requests coalesce.
        let (refresh_tx, refresh_rx) = crossbeam_channel::bounded(1);
        let stop = Arc::new(AtomicBool::new(false));

        let thread_path = path.clone();
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(format!("tessera-watch {}", path.display()))
            .spawn(move || scan_loop(thread_path, config, refresh_rx, events, thread_stop))
            .expect("failed to spawn watcher thread");

        Ok(Self {
            path,
            refresh_tx,
            stop,
            handle: Some(handle),
        })
    }

    /// The normalized root this watcher monitors.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Requests a rescan. Returns immediately; the scan happens on the
    /// watcher's own thread.
    pub fn refresh(&self) {
        match self.refresh_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                log::warn!("Refresh requested on stopped watcher: {}", self.path.display());
            }
        }
    }

    /// Stops the background loop and joins the thread.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.refresh_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("path", &self.path)
            .finish()
    }
}

fn scan_loop(
    root: PathBuf,
    config: WatchConfig,
    refresh_rx: Receiver<()>,
    events: flume::Sender<WatchEvent>,
    stop: Arc<AtomicBool>,
) {
    log::info!("Watcher thread started: {}", root.display());

    let mut known: HashMap<PathBuf, SystemTime> = HashMap::new();

    loop {
        let wake = match config.poll_interval {
            Some(interval) => match refresh_rx.recv_timeout(interval) {
                Ok(()) => true,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => true,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => false,
            },
            None => refresh_rx.recv().is_ok(),
        };

        if !wake || stop.load(Ordering::SeqCst) {
            break;
        }

        scan(&root, &config, &mut known, &events);
    }

    log::info!("Watcher thread stopped: {}", root.display());
}

/// One full scan: diff the manifests on disk against the last snapshot and
/// publish the resulting events.
fn scan(
    root: &Path,
    config: &WatchConfig,
    known: &mut HashMap<PathBuf, SystemTime>,
    events: &flume::Sender<WatchEvent>,
) {
    let present = find_manifests(root, config);
    let now = SystemTime::now();

    let tracked: Vec<PathBuf> = known.keys().cloned().collect();
    for path in tracked {
        if !present.contains(&path) {
            known.remove(&path);
            log::debug!("Manifest removed: {}", path.display());
            publish(events, WatchEvent::Removed(path));
            continue;
        }

        let stamp = known[&path];
        let module_dir = match path.parent() {
            Some(dir) => dir,
            None => continue,
        };

        if tree_changed_since(module_dir, stamp, config) {
            known.insert(path.clone(), now);
            log::debug!("Manifest changed: {}", path.display());
            publish(events, WatchEvent::Changed(path));
        }
    }

    for path in present {
        if !known.contains_key(&path) {
            known.insert(path.clone(), now);
            log::debug!("Manifest found: {}", path.display());
            publish(events, WatchEvent::Found(path));
        }
    }
}

fn publish(events: &flume::Sender<WatchEvent>, event: WatchEvent) {
    if events.send(event).is_err() {
        log::error!("Watch event consumer disconnected.");
    }
}

fn find_manifests(root: &Path, config: &WatchConfig) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .follow_links(false)
        .max_depth(config.max_depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext == config.manifest_extension.as_str())
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Whether anything under `dir` (the manifest's directory tree) was written
/// after `stamp`. Manifest files themselves are excluded so that persisting
/// an enabled flag does not read back as a module change.
fn tree_changed_since(dir: &Path, stamp: SystemTime, config: &WatchConfig) -> bool {
    walkdir::WalkDir::new(dir)
        .follow_links(false)
        .max_depth(config.max_depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            !(entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == config.manifest_extension.as_str()))
        })
        .filter_map(|entry| entry.metadata().ok())
        .filter_map(|meta| meta.modified().ok())
        .any(|modified| modified > stamp)
}
