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

//! A discovered content package: manifest metadata plus code, asset, and
//! scene resources composed behind one aggregate load state.
//!
//! Loading is ordered: the code resource loads synchronously first (later
//! steps may depend on what it defines), then assets and scenes load
//! concurrently with combined progress. Once everything is up, every handler
//! the code units registered gets its loaded hook, with individual failures
//! logged and contained. Unloading reverses the order.
//!
//! A module also tracks which other modules it conflicts with. Two valid
//! modules conflict when they declare the same code unit file name or scene
//! name, and a module refuses to load while any conflicting module is
//! loaded.

use crate::dispatcher::{Dispatcher, TaskStep};
use crate::resource::{BundleWork, CodeWork, SceneSetWork};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use tessera_core::event::Hook;
use tessera_core::host::{ContentAccess, HostBindings, ModuleHandler};
use tessera_core::manifest::{ContentFlags, ContentKind, ModuleManifest, Platform};
use tessera_core::resource::{LoadState, Resource, ResourceEvent, ResourceWork, WorkStep};

/// The aggregate work body: drives the three child resources in the
/// documented order and reports their combined progress.
struct ModuleWork {
    content: ContentFlags,
    code: Resource<CodeWork>,
    assets: Resource<BundleWork>,
    scenes: Resource<SceneSetWork>,
}

impl ModuleWork {
    fn combined_progress(&self) -> f32 {
        let mut total = 0.0;
        let mut count = 0;
        if self.content.contains(ContentKind::Assets) {
            total += self.assets.progress();
            count += 1;
        }
        if self.content.contains(ContentKind::Scenes) {
            total += self.scenes.progress();
            count += 1;
        }
        if count == 0 {
            1.0
        } else {
            total / count as f32
        }
    }

    /// Drives one child toward Loaded. Returns `true` while it is not
    /// there yet.
    fn drive<W: ResourceWork>(resource: &mut Resource<W>) -> bool {
        match resource.state() {
            LoadState::Unloaded => {
                if !resource.can_load() {
                    return false;
                }
                resource.load_async();
            }
            LoadState::Loading | LoadState::Cancelling | LoadState::Unloading => {
                resource.tick();
            }
            LoadState::Loaded => {}
        }
        resource.state() != LoadState::Loaded
    }

    /// Drives one child all the way to Unloaded, blocking.
    fn settle_unload<W: ResourceWork>(resource: &mut Resource<W>) {
        loop {
            match resource.state() {
                LoadState::Unloaded => break,
                LoadState::Loaded | LoadState::Loading => {
                    resource.unload();
                }
                LoadState::Cancelling | LoadState::Unloading => {
                    resource.tick();
                }
            }
        }
    }
}

impl ResourceWork for ModuleWork {
    fn load_step(&mut self) -> WorkStep {
        // Code first, synchronously: asset and scene loading may depend on
        // types the units define. Unloadable code is caught by module
        // admission; don't spin on it here.
        if self.content.contains(ContentKind::Code)
            && self.code.state() != LoadState::Loaded
            && self.code.can_load()
        {
            self.code.load();
            return WorkStep::Pending(self.combined_progress());
        }

        let mut busy = false;
        if self.content.contains(ContentKind::Assets) {
            busy |= Self::drive(&mut self.assets);
        }
        if self.content.contains(ContentKind::Scenes) {
            busy |= Self::drive(&mut self.scenes);
        }

        if busy {
            WorkStep::Pending(self.combined_progress())
        } else {
            WorkStep::Done
        }
    }

    fn unload_step(&mut self) -> WorkStep {
        // Scenes come down first, one blocking teardown per step.
        if self.content.contains(ContentKind::Scenes) && self.scenes.state() != LoadState::Unloaded
        {
            match self.scenes.state() {
                LoadState::Loaded | LoadState::Loading => {
                    self.scenes.unload();
                }
                LoadState::Cancelling | LoadState::Unloading => {
                    self.scenes.tick();
                }
                LoadState::Unloaded => {}
            }
            if self.scenes.state() != LoadState::Unloaded {
                return WorkStep::Pending(0.5);
            }
        }

        Self::settle_unload(&mut self.code);
        Self::settle_unload(&mut self.assets);
        WorkStep::Done
    }
}

struct ModuleBody {
    manifest: ModuleManifest,
    resource: Resource<ModuleWork>,
    valid: bool,
    conflicting: Vec<Weak<Module>>,
    handlers: Vec<Box<dyn ModuleHandler>>,
    content_access: Option<Arc<ContentAccess>>,
    ticking: bool,
    unit_names: Vec<String>,
    scene_names: Vec<String>,
}

/// A discovered, independently loadable content package.
///
/// Constructed by the registry when a manifest is discovered; handed to host
/// code as an `Arc<Module>`. All load/unload driving happens on the
/// dispatcher thread.
pub struct Module {
    name: String,
    path: PathBuf,
    dispatcher: Dispatcher,
    /// Back-reference to this module's own allocation, for handing weak
    /// references to dispatcher tasks and conflict lists.
    weak: Weak<Module>,
    body: Mutex<ModuleBody>,
    lifecycle: Mutex<Hook<ResourceEvent>>,
}

impl Module {
    /// Builds a module from the manifest at `path`.
    ///
    /// Runs filesystem reads and code validation, so it is intended to be
    /// called off the dispatcher thread. An unreadable or corrupt manifest
    /// still yields a module (permanently invalid, with the failure
    /// recorded) so the host can surface it.
    pub fn create(path: &Path, bindings: &HostBindings, dispatcher: Dispatcher) -> Arc<Module> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        match ModuleManifest::load(&canonical) {
            Ok(manifest) => Self::from_manifest(manifest, bindings, dispatcher),
            Err(e) => {
                log::warn!("Module manifest rejected: {e}");
                Self::invalid_placeholder(canonical, e.to_string(), bindings, dispatcher)
            }
        }
    }

    fn from_manifest(
        manifest: ModuleManifest,
        bindings: &HostBindings,
        dispatcher: Dispatcher,
    ) -> Arc<Module> {
        let name = manifest.name.clone();
        let path = manifest.path.clone();
        let module_dir = manifest.module_dir().to_path_buf();
        let platform_dir = module_dir.join(
            Platform::current()
                .map(Platform::dir_name)
                .unwrap_or("unknown"),
        );
        let bundle_stem = name.to_lowercase();

        let (code_work, code_errors) =
            CodeWork::discover(&module_dir, &bindings.validator, Arc::clone(&bindings.code));
        let mut code = Resource::new(format!("{name} code"), code_work);
        if manifest.content.contains(ContentKind::Code) {
            for error in code_errors {
                log::warn!("{error}");
                code.push_error(error);
            }
        }

        let (bundle_work, bundle_errors) = BundleWork::open(
            platform_dir.join(format!("{bundle_stem}.assets")),
            Arc::clone(&bindings.bundles),
        );
        let mut assets = Resource::new(format!("{name} assets"), bundle_work);
        if manifest.content.contains(ContentKind::Assets) {
            for error in bundle_errors {
                log::warn!("{error}");
                assets.push_error(error);
            }
        }

        let (scene_work, scene_errors) = SceneSetWork::open(
            platform_dir.join(format!("{bundle_stem}.scenes")),
            Arc::clone(&bindings.scenes),
        );
        let mut scenes = Resource::new(format!("{name} scenes"), scene_work);
        if manifest.content.contains(ContentKind::Scenes) {
            for error in scene_errors {
                log::warn!("{error}");
                scenes.push_error(error);
            }
        }

        let unit_names = code.work().unit_names();
        let scene_names = scenes.work().scene_names();

        let work = ModuleWork {
            content: manifest.content,
            code,
            assets,
            scenes,
        };

        let module = Arc::new_cyclic(|weak| Module {
            name: name.clone(),
            path,
            dispatcher,
            weak: weak.clone(),
            body: Mutex::new(ModuleBody {
                manifest,
                resource: Resource::new(name, work),
                valid: true,
                conflicting: Vec::new(),
                handlers: Vec::new(),
                content_access: None,
                ticking: false,
                unit_names,
                scene_names,
            }),
            lifecycle: Mutex::new(Hook::new()),
        });

        {
            let mut body = module.body.lock().expect("module body poisoned");
            Self::check_resources(&mut body, &module.name);
        }

        module
    }

    fn invalid_placeholder(
        path: PathBuf,
        error: String,
        bindings: &HostBindings,
        dispatcher: Dispatcher,
    ) -> Arc<Module> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());

        let manifest = ModuleManifest {
            name: name.clone(),
            author: String::new(),
            description: String::new(),
            version: String::new(),
            platforms: Default::default(),
            content: ContentFlags::NONE,
            enabled: false,
            path: path.clone(),
        };

        let module_dir = manifest.module_dir().to_path_buf();
        let (code_work, _) =
            CodeWork::discover(&module_dir, &bindings.validator, Arc::clone(&bindings.code));
        let (bundle_work, _) = BundleWork::open(
            module_dir.join("missing.assets"),
            Arc::clone(&bindings.bundles),
        );
        let (scene_work, _) = SceneSetWork::open(
            module_dir.join("missing.scenes"),
            Arc::clone(&bindings.scenes),
        );

        let work = ModuleWork {
            content: ContentFlags::NONE,
            code: Resource::new(format!("{name} code"), code_work),
            assets: Resource::new(format!("{name} assets"), bundle_work),
            scenes: Resource::new(format!("{name} scenes"), scene_work),
        };

        let mut resource = Resource::new(name.clone(), work);
        resource.push_error(error);

        Arc::new_cyclic(|weak| Module {
            name,
            path,
            dispatcher,
            weak: weak.clone(),
            body: Mutex::new(ModuleBody {
                manifest,
                resource,
                valid: false,
                conflicting: Vec::new(),
                handlers: Vec::new(),
                content_access: None,
                ticking: false,
                unit_names: Vec::new(),
                scene_names: Vec::new(),
            }),
            lifecycle: Mutex::new(Hook::new()),
        })
    }

    /// Re-checks resource availability, invalidating the module when a
    /// backing file has gone missing since discovery. Deliberately run on
    /// every admission check rather than cached.
    fn check_resources(body: &mut ModuleBody, name: &str) {
        if !body.manifest.platforms.supports_host() {
            if body.valid {
                log::warn!("Platform not supported for module: {name}");
            }
            body.valid = false;
            return;
        }

        let work = body.resource.work();
        let content = body.manifest.content;

        if content.contains(ContentKind::Code)
            && (!work.code.can_load() || !work.code.work().units_present())
        {
            if body.valid {
                log::warn!("Code units missing for module: {name}");
            }
            body.valid = false;
        }

        if content.contains(ContentKind::Assets)
            && (!work.assets.can_load() || !work.assets.work().bundle_present())
        {
            if body.valid {
                log::warn!("Assets bundle missing for module: {name}");
            }
            body.valid = false;
        }

        if content.contains(ContentKind::Scenes)
            && (!work.scenes.can_load() || !work.scenes.work().bundle_present())
        {
            if body.valid {
                log::warn!("Scenes bundle missing for module: {name}");
            }
            body.valid = false;
        }
    }

    /// The module's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The canonical path of the module's manifest.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A copy of the module's manifest.
    pub fn manifest(&self) -> ModuleManifest {
        self.lock_body().manifest.clone()
    }

    /// The kinds of content this module declares.
    pub fn content(&self) -> ContentFlags {
        self.lock_body().manifest.content
    }

    /// The module's aggregate load state.
    pub fn state(&self) -> LoadState {
        self.lock_body().resource.state()
    }

    /// The combined load progress of the module's resources.
    pub fn progress(&self) -> f32 {
        self.lock_body().resource.progress()
    }

    /// Whether a load or unload pass is in flight.
    pub fn is_busy(&self) -> bool {
        self.lock_body().resource.is_busy()
    }

    /// Every error recorded against the module and its resources.
    pub fn errors(&self) -> Vec<String> {
        let body = self.lock_body();
        let work = body.resource.work();
        body.resource
            .errors()
            .iter()
            .chain(work.code.errors())
            .chain(work.assets.errors())
            .chain(work.scenes.errors())
            .cloned()
            .collect()
    }

    /// Whether the module is valid. Invalid modules are never offered for
    /// loading; a module goes invalid when its backing files disappear or
    /// validation fails.
    pub fn is_valid(&self) -> bool {
        self.lock_body().valid
    }

    /// Marks the module invalid.
    pub fn invalidate(&self) {
        self.lock_body().valid = false;
    }

    /// Whether the module is enabled. Persisted in the manifest.
    pub fn is_enabled(&self) -> bool {
        self.lock_body().manifest.enabled
    }

    /// Enables or disables the module, persisting the flag to disk.
    pub fn set_enabled(&self, enabled: bool) {
        let mut body = self.lock_body();
        if body.manifest.enabled == enabled {
            return;
        }
        body.manifest.enabled = enabled;
        if let Err(e) = body.manifest.save() {
            log::error!("Failed to persist enabled flag for {}: {e}", self.name);
        }
    }

    /// The file names of the module's code units.
    pub fn unit_names(&self) -> Vec<String> {
        self.lock_body().unit_names.clone()
    }

    /// The names of the module's scenes.
    pub fn scene_names(&self) -> Vec<String> {
        self.lock_body().scene_names.clone()
    }

    /// The identifiers of the assets in the module's bundle.
    pub fn asset_ids(&self) -> Vec<String> {
        self.lock_body().resource.work().assets.work().asset_ids().to_vec()
    }

    /// A view of the module's loaded content, while the module is loaded.
    pub fn content_access(&self) -> Option<Arc<ContentAccess>> {
        self.lock_body().content_access.clone()
    }

    /// Whether the module may begin loading: valid, resources present, and
    /// no conflicting module currently loaded. Re-validated on every call
    /// because backing files can disappear between discovery and a load
    /// attempt.
    pub fn can_load(&self) -> bool {
        let (valid, conflicting) = {
            let mut body = self.lock_body();
            Self::check_resources(&mut body, &self.name);
            (body.valid, body.conflicting.clone())
        };

        valid && !Self::any_conflicting(&conflicting, |m| m.state() != LoadState::Unloaded)
    }

    /// Whether any conflicting module is currently loaded (or mid-pass).
    pub fn conflicting_loaded(&self) -> bool {
        let conflicting = self.lock_body().conflicting.clone();
        Self::any_conflicting(&conflicting, |m| m.state() != LoadState::Unloaded)
    }

    /// Whether any conflicting module is enabled.
    pub fn conflicting_enabled(&self) -> bool {
        let conflicting = self.lock_body().conflicting.clone();
        Self::any_conflicting(&conflicting, |m| m.is_enabled())
    }

    /// The modules currently conflicting with this one.
    pub fn conflicting_modules(&self) -> Vec<Arc<Module>> {
        self.lock_body()
            .conflicting
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    fn any_conflicting(conflicting: &[Weak<Module>], f: impl Fn(&Arc<Module>) -> bool) -> bool {
        conflicting.iter().filter_map(Weak::upgrade).any(|m| f(&m))
    }

    /// Updates this module's conflict list against `other`.
    ///
    /// Two valid modules conflict when they declare an identical code unit
    /// file name or scene name. Checking against an invalid module removes
    /// it from the list; invalid modules cannot conflict.
    pub fn update_conflicts(&self, other: &Arc<Module>) {
        if std::ptr::eq(self, Arc::as_ptr(other)) || !self.is_valid() {
            return;
        }

        if !other.is_valid() {
            let mut body = self.lock_body();
            body.conflicting
                .retain(|w| w.upgrade().map(|m| !Arc::ptr_eq(&m, other)).unwrap_or(false));
            return;
        }

        let other_units = other.unit_names();
        let other_scenes = other.scene_names();

        let mut body = self.lock_body();

        let unit_clash = body
            .unit_names
            .iter()
            .find(|name| other_units.contains(name));
        let scene_clash = body
            .scene_names
            .iter()
            .find(|name| other_scenes.contains(name));

        let clash = match (unit_clash, scene_clash) {
            (Some(name), _) | (None, Some(name)) => name.clone(),
            (None, None) => return,
        };

        let already = body
            .conflicting
            .iter()
            .any(|w| w.upgrade().map(|m| Arc::ptr_eq(&m, other)).unwrap_or(false));
        if !already {
            log::warn!(
                "Resource '{clash}' of {} conflicting with {}",
                other.name,
                self.name
            );
            body.conflicting.push(Arc::downgrade(other));
        }
    }

    /// Loads the module, blocking the dispatcher thread until done.
    /// Refused (with a log message) when [`Self::can_load`] is false.
    pub fn load(&self) {
        if self.state() == LoadState::Unloaded && !self.can_load() {
            log::warn!("Module can not be loaded: {}", self.name);
            return;
        }

        log::info!("Loading module: {}", self.name);
        let events = {
            let mut body = self.lock_body();
            body.resource.load()
        };
        self.after_drive(events);
    }

    /// Begins loading the module; the dispatcher's tick loop drives it to
    /// completion. Refused when [`Self::can_load`] is false.
    pub fn load_async(&self) {
        if self.state() == LoadState::Unloaded && !self.can_load() {
            log::warn!("Module can not be loaded: {}", self.name);
            return;
        }

        log::info!("Async loading module: {}", self.name);
        let events = {
            let mut body = self.lock_body();
            body.resource.load_async()
        };
        self.after_drive(events);
        self.ensure_ticking();
    }

    /// Unloads the module. While loading, this cancels the in-flight pass
    /// cooperatively.
    pub fn unload(&self) {
        if self.state() == LoadState::Loaded {
            log::info!("Unloading module: {}", self.name);
            self.run_unloaded_hooks();
        }

        let events = {
            let mut body = self.lock_body();
            body.resource.unload()
        };
        self.after_drive(events);
        self.ensure_ticking();
    }

    /// Registers a callback for this module's lifecycle notifications
    /// (loaded, unloaded, cancelled, resumed, progress). Callbacks run on
    /// the dispatcher thread.
    pub fn connect_lifecycle(&self, callback: impl FnMut(&ResourceEvent) + Send + 'static) {
        self.lifecycle
            .lock()
            .expect("module lifecycle hook poisoned")
            .connect(callback);
    }

    fn lock_body(&self) -> std::sync::MutexGuard<'_, ModuleBody> {
        self.body.lock().expect("module body poisoned")
    }

    fn ensure_ticking(&self) {
        {
            let mut body = self.lock_body();
            if body.ticking || !body.resource.is_busy() {
                return;
            }
            body.ticking = true;
        }

        let weak = self.weak.clone();
        self.dispatcher.add_task(move || match weak.upgrade() {
            Some(module) => module.tick_once(),
            None => TaskStep::Done,
        });
    }

    fn tick_once(&self) -> TaskStep {
        let events = {
            let mut body = self.lock_body();
            body.resource.tick()
        };
        self.after_drive(events);

        let mut body = self.lock_body();
        if body.resource.is_busy() {
            TaskStep::Again
        } else {
            body.ticking = false;
            TaskStep::Done
        }
    }

    /// Processes the notifications of one drive: surfaces code load
    /// failures, runs loaded hooks, and fans events out to listeners.
    fn after_drive(&self, events: Vec<ResourceEvent>) {
        let code_errors = {
            let mut body = self.lock_body();
            body.resource.work_mut().code.work_mut().take_load_errors()
        };
        if !code_errors.is_empty() {
            for error in &code_errors {
                log::error!("Code unit failed to load for {}: {error}", self.name);
            }
            self.invalidate();
            self.unload();
            return;
        }

        for event in &events {
            if matches!(event, ResourceEvent::Loaded) {
                self.on_loaded();
            }
        }

        self.emit_lifecycle(events);
    }

    fn emit_lifecycle(&self, events: Vec<ResourceEvent>) {
        if events.is_empty() {
            return;
        }

        // Swap the hook out so a callback may connect further callbacks
        // (or drive this module) without deadlocking.
        let mut hook = {
            let mut slot = self
                .lifecycle
                .lock()
                .expect("module lifecycle hook poisoned");
            std::mem::take(&mut *slot)
        };

        for event in events {
            hook.emit(&event);
        }

        let mut slot = self
            .lifecycle
            .lock()
            .expect("module lifecycle hook poisoned");
        hook.append(std::mem::take(&mut *slot));
        *slot = hook;
    }

    /// Invokes every registered handler's loaded hook. A failing handler is
    /// logged and does not block the others.
    fn on_loaded(&self) {
        let (mut handlers, access) = {
            let mut body = self.lock_body();
            let work = body.resource.work_mut();

            let handlers = work.code.work_mut().drain_handlers();
            let access = Arc::new(ContentAccess::new(
                work.assets.work().asset_ids().to_vec(),
                work.scenes.work().active_scenes(),
                work.assets.work().loaded().map(|b| b.handle),
            ));
            body.content_access = Some(Arc::clone(&access));
            (handlers, access)
        };

        for handler in handlers.iter_mut() {
            if let Err(e) = handler.on_loaded(&access) {
                log::error!("Module handler failed on load for {}: {e:#}", self.name);
            }
        }

        let mut body = self.lock_body();
        body.handlers = handlers;
    }

    /// Invokes every handler's unloaded hook and clears the cached
    /// instances and content view.
    fn run_unloaded_hooks(&self) {
        let mut handlers = {
            let mut body = self.lock_body();
            body.content_access = None;
            std::mem::take(&mut body.handlers)
        };

        for handler in handlers.iter_mut() {
            if let Err(e) = handler.on_unloaded() {
                log::error!("Module handler failed on unload for {}: {e:#}", self.name);
            }
        }
        // Instances drop here; a reload builds fresh ones from the units.
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}
