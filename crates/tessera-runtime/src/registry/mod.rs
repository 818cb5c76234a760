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

//! Finds and keeps track of modules across watched directories.
//!
//! Raw file events flow from the watcher threads into one intake thread,
//! which does the CPU-bound module construction and validation off the
//! designated thread. Every mutation of the tracked module set is then
//! marshaled through the dispatcher, so host-facing events fire on the
//! designated thread, after the mutation, in mutation order, and never
//! concurrently.
//!
//! Removal is deferred for busy modules: a module whose backing files
//! disappear while it is loaded (or mid-pass) is invalidated and parked
//! until it settles in Unloaded, at which point a synthetic change cycle
//! removes it and, if the files are back, rediscovers them.

use crate::dispatcher::Dispatcher;
use crate::module::Module;
use crate::watch::{DirectoryWatcher, WatchConfig, WatchError, WatchEvent};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tessera_core::event::Hook;
use tessera_core::host::HostBindings;
use tessera_core::resource::{LoadState, ResourceEvent};

#[derive(Default)]
struct RegistryHooks {
    module_found: Hook<Arc<Module>>,
    module_removed: Hook<Arc<Module>>,
    module_loaded: Hook<Arc<Module>>,
    module_unloaded: Hook<Arc<Module>>,
    modules_changed: Hook<()>,
}

impl RegistryHooks {
    fn append(&mut self, other: RegistryHooks) {
        self.module_found.append(other.module_found);
        self.module_removed.append(other.module_removed);
        self.module_loaded.append(other.module_loaded);
        self.module_unloaded.append(other.module_unloaded);
        self.modules_changed.append(other.modules_changed);
    }
}

struct RegistryInner {
    dispatcher: Dispatcher,
    bindings: HostBindings,
    watch_config: WatchConfig,
    /// Path → module index, owned by the intake thread.
    index: Mutex<HashMap<PathBuf, Arc<Module>>>,
    /// The tracked set, mutated only via dispatcher actions.
    modules: Mutex<Vec<Arc<Module>>>,
    /// Paths whose removal is deferred until their module settles.
    pending_refresh: Mutex<HashSet<PathBuf>>,
    watchers: Mutex<Vec<DirectoryWatcher>>,
    intake_tx: Mutex<Option<flume::Sender<WatchEvent>>>,
    hooks: Mutex<RegistryHooks>,
}

/// The orchestrator: owns the directory watchers, converts file events into
/// [`Module`]s, tracks the known set, recomputes conflicts, and re-emits
/// host-facing events on the dispatcher thread.
pub struct ModuleRegistry {
    inner: Arc<RegistryInner>,
    intake_handle: Option<JoinHandle<()>>,
}

impl ModuleRegistry {
    /// Creates a registry driving its events through `dispatcher` and
    /// delegating resource operations to `bindings`.
    pub fn new(dispatcher: Dispatcher, bindings: HostBindings) -> Self {
        Self::with_watch_config(dispatcher, bindings, WatchConfig::default())
    }

    /// Creates a registry with a custom watch configuration.
    pub fn with_watch_config(
        dispatcher: Dispatcher,
        bindings: HostBindings,
        watch_config: WatchConfig,
    ) -> Self {
        let (intake_tx, intake_rx) = flume::unbounded();

        let inner = Arc::new(RegistryInner {
            dispatcher,
            bindings,
            watch_config,
            index: Mutex::new(HashMap::new()),
            modules: Mutex::new(Vec::new()),
            pending_refresh: Mutex::new(HashSet::new()),
            watchers: Mutex::new(Vec::new()),
            intake_tx: Mutex::new(Some(intake_tx)),
            hooks: Mutex::new(RegistryHooks::default()),
        });

        let thread_inner = Arc::clone(&inner);
        let intake_handle = std::thread::Builder::new()
            .name("tessera-intake".to_string())
            .spawn(move || intake_loop(thread_inner, intake_rx))
            .expect("failed to spawn intake thread");

        Self {
            inner,
            intake_handle: Some(intake_handle),
        }
    }

    /// Registers a directory to be watched for modules and kicks off its
    /// first scan. Registering the same directory twice is a no-op.
    ///
    /// # Errors
    /// Fails when the path cannot be resolved to an existing directory.
    pub fn register_directory(&self, path: &Path) -> Result<(), WatchError> {
        let canonical = path.canonicalize().map_err(|source| WatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let sender = match &*self.inner.intake_tx.lock().expect("intake sender poisoned") {
            Some(tx) => tx.clone(),
            None => {
                log::warn!("Registry is shut down; ignoring directory registration.");
                return Ok(());
            }
        };

        {
            let watchers = self.inner.watchers.lock().expect("watcher list poisoned");
            if watchers.iter().any(|w| w.path() == canonical) {
                return Ok(());
            }
        }

        let watcher =
            DirectoryWatcher::spawn(&canonical, self.inner.watch_config.clone(), sender)?;
        watcher.refresh();

        self.inner
            .watchers
            .lock()
            .expect("watcher list poisoned")
            .push(watcher);

        Ok(())
    }

    /// Stops watching a directory, joining its background thread. Modules
    /// already discovered under it stay tracked.
    pub fn unregister_directory(&self, path: &Path) {
        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(_) => return,
        };

        let watcher = {
            let mut watchers = self.inner.watchers.lock().expect("watcher list poisoned");
            watchers
                .iter()
                .position(|w| w.path() == canonical)
                .map(|pos| watchers.remove(pos))
        };

        if let Some(mut watcher) = watcher {
            watcher.stop();
        }
    }

    /// Requests a rescan of every watched directory.
    pub fn refresh_all(&self) {
        for watcher in self
            .inner
            .watchers
            .lock()
            .expect("watcher list poisoned")
            .iter()
        {
            watcher.refresh();
        }
    }

    /// A snapshot of every tracked module.
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.inner
            .modules
            .lock()
            .expect("module list poisoned")
            .clone()
    }

    /// Looks a tracked module up by name.
    pub fn find(&self, name: &str) -> Option<Arc<Module>> {
        self.inner
            .modules
            .lock()
            .expect("module list poisoned")
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    /// Registers a callback for newly discovered modules.
    pub fn on_module_found(&self, callback: impl FnMut(&Arc<Module>) + Send + 'static) {
        self.lock_hooks().module_found.connect(callback);
    }

    /// Registers a callback for removed modules. The module is invalid by
    /// the time the callback sees it.
    pub fn on_module_removed(&self, callback: impl FnMut(&Arc<Module>) + Send + 'static) {
        self.lock_hooks().module_removed.connect(callback);
    }

    /// Registers a callback for modules that finished loading.
    pub fn on_module_loaded(&self, callback: impl FnMut(&Arc<Module>) + Send + 'static) {
        self.lock_hooks().module_loaded.connect(callback);
    }

    /// Registers a callback for modules that finished unloading.
    pub fn on_module_unloaded(&self, callback: impl FnMut(&Arc<Module>) + Send + 'static) {
        self.lock_hooks().module_unloaded.connect(callback);
    }

    /// Registers a callback fired after any change to the tracked set.
    pub fn on_modules_changed(&self, callback: impl FnMut(&()) + Send + 'static) {
        self.lock_hooks().modules_changed.connect(callback);
    }

    /// Stops every watcher and the intake thread, joining them all.
    pub fn shutdown(&mut self) {
        {
            let mut watchers = self.inner.watchers.lock().expect("watcher list poisoned");
            for watcher in watchers.iter_mut() {
                watcher.stop();
            }
            watchers.clear();
        }

        self.inner
            .intake_tx
            .lock()
            .expect("intake sender poisoned")
            .take();

        if let Some(handle) = self.intake_handle.take() {
            let _ = handle.join();
        }
    }

    fn lock_hooks(&self) -> std::sync::MutexGuard<'_, RegistryHooks> {
        self.inner.hooks.lock().expect("registry hooks poisoned")
    }
}

impl Drop for ModuleRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.inner.modules.lock().map(|m| m.len()).unwrap_or(0))
            .finish()
    }
}

/// Consumes raw watch events, constructing modules off the designated
/// thread and marshaling all set mutations through the dispatcher.
fn intake_loop(inner: Arc<RegistryInner>, rx: flume::Receiver<WatchEvent>) {
    log::info!("Registry intake thread started.");

    for event in rx.iter() {
        match event {
            WatchEvent::Found(path) => handle_found(&inner, path),
            WatchEvent::Removed(path) => handle_removed(&inner, path),
            WatchEvent::Changed(path) => {
                log::info!("Module refreshing: {}", path.display());
                handle_removed(&inner, path.clone());
                if path.exists() {
                    handle_found(&inner, path);
                }
            }
        }
    }

    log::info!("Registry intake thread stopped.");
}

fn handle_found(inner: &Arc<RegistryInner>, path: PathBuf) {
    {
        let index = inner.index.lock().expect("module index poisoned");
        if index.contains_key(&path) {
            return;
        }
    }

    // Construction reads the filesystem and runs validation; doing it here
    // keeps the designated thread responsive.
    let module = Module::create(&path, &inner.bindings, inner.dispatcher.clone());

    inner
        .index
        .lock()
        .expect("module index poisoned")
        .insert(path, Arc::clone(&module));

    let action_inner = Arc::clone(inner);
    inner
        .dispatcher
        .enqueue_deferred(move || register(&action_inner, module));
}

fn handle_removed(inner: &Arc<RegistryInner>, path: PathBuf) {
    let module = {
        let index = inner.index.lock().expect("module index poisoned");
        index.get(&path).cloned()
    };
    let Some(module) = module else {
        return;
    };

    if module.state() != LoadState::Unloaded {
        // Busy: defer until the module settles, but stop it accepting
        // new loads right away.
        let action_inner = Arc::clone(inner);
        inner.dispatcher.enqueue_deferred(move || {
            queue_refresh(&action_inner, module);
        });
        return;
    }

    inner
        .index
        .lock()
        .expect("module index poisoned")
        .remove(&path);

    let action_inner = Arc::clone(inner);
    inner
        .dispatcher
        .enqueue_deferred(move || remove(&action_inner, module));
}

/// Dispatcher-thread action: adds a constructed module to the tracked set,
/// wiring its lifecycle into the registry and recomputing conflicts.
fn register(inner: &Arc<RegistryInner>, module: Arc<Module>) {
    let weak_inner = Arc::downgrade(inner);
    let weak_module = Arc::downgrade(&module);
    module.connect_lifecycle(move |event| {
        if let (Some(inner), Some(module)) = (weak_inner.upgrade(), weak_module.upgrade()) {
            on_module_event(&inner, &module, event);
        }
    });

    {
        let mut modules = inner.modules.lock().expect("module list poisoned");
        for other in modules.iter() {
            module.update_conflicts(other);
            other.update_conflicts(&module);
        }
        modules.push(Arc::clone(&module));
    }

    log::info!("Module found: {} - {:?}", module.name(), module.content());
    emit(inner, |hooks| {
        hooks.module_found.emit(&module);
        hooks.modules_changed.emit(&());
    });
}

/// Dispatcher-thread action: parks a busy module for deferred removal.
fn queue_refresh(inner: &Arc<RegistryInner>, module: Arc<Module>) {
    let mut pending = inner
        .pending_refresh
        .lock()
        .expect("pending refresh set poisoned");
    if pending.insert(module.path().to_path_buf()) {
        log::info!("Module refresh queued: {}", module.name());
        module.invalidate();
    }
}

/// Dispatcher-thread action: drops a module from the tracked set.
fn remove(inner: &Arc<RegistryInner>, module: Arc<Module>) {
    module.invalidate();

    {
        let mut modules = inner.modules.lock().expect("module list poisoned");
        for other in modules.iter() {
            if !Arc::ptr_eq(other, &module) {
                // The module is invalid now, so this clears it from the
                // other side's conflict list.
                other.update_conflicts(&module);
            }
        }
        modules.retain(|m| !Arc::ptr_eq(m, &module));
    }

    log::info!("Module removed: {}", module.name());
    emit(inner, |hooks| {
        hooks.module_removed.emit(&module);
        hooks.modules_changed.emit(&());
    });
}

/// Runs on the dispatcher thread for every lifecycle notification of a
/// tracked module.
fn on_module_event(inner: &Arc<RegistryInner>, module: &Arc<Module>, event: &ResourceEvent) {
    match event {
        ResourceEvent::Loaded => {
            emit(inner, |hooks| hooks.module_loaded.emit(module));
        }
        ResourceEvent::Unloaded | ResourceEvent::LoadCancelled => {
            if matches!(event, ResourceEvent::Unloaded) {
                emit(inner, |hooks| hooks.module_unloaded.emit(module));
            }

            // A parked module has settled: re-drive a synthetic change so
            // it gets removed and, if its files are back, rediscovered.
            let path = module.path().to_path_buf();
            let parked = inner
                .pending_refresh
                .lock()
                .expect("pending refresh set poisoned")
                .remove(&path);
            if parked {
                if let Some(tx) = &*inner.intake_tx.lock().expect("intake sender poisoned") {
                    let _ = tx.send(WatchEvent::Changed(path));
                }
            }
        }
        _ => {}
    }
}

/// Fires registry hooks with the struct swapped out, so callbacks may
/// register further callbacks without deadlocking.
fn emit(inner: &Arc<RegistryInner>, f: impl FnOnce(&mut RegistryHooks)) {
    let mut hooks = {
        let mut slot = inner.hooks.lock().expect("registry hooks poisoned");
        std::mem::take(&mut *slot)
    };

    f(&mut hooks);

    let mut slot = inner.hooks.lock().expect("registry hooks poisoned");
    hooks.append(std::mem::take(&mut *slot));
    *slot = hooks;
}
