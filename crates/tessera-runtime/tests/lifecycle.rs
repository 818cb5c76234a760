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

//! Module lifecycle through the registry: loading, handler hooks,
//! cancellation and resumption, conflicts, and deferred removal.

mod common;

use common::{bindings, init_logs, pump_until, rejecting_bindings, write_module};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tessera_core::resource::{LoadState, ResourceEvent};
use tessera_core::ModuleManifest;
use tessera_runtime::{Dispatcher, Module, ModuleRegistry};

fn discover_one(
    registry: &ModuleRegistry,
    dispatcher: &Dispatcher,
    name: &str,
) -> Arc<Module> {
    pump_until(dispatcher, || registry.find(name).is_some());
    registry.find(name).unwrap()
}

#[test]
fn loading_runs_handler_hooks_and_fires_registry_events() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "alpha", &["Hall"], &["rock"]);

    let dispatcher = Dispatcher::new();
    let (host, hook_log) = bindings(1);
    let registry = ModuleRegistry::new(dispatcher.clone(), host);

    let loaded_events = Arc::new(AtomicUsize::new(0));
    let unloaded_events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loaded_events);
    registry.on_module_loaded(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&unloaded_events);
    registry.on_module_unloaded(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    registry.register_directory(root.path()).unwrap();
    let module = discover_one(&registry, &dispatcher, "alpha");

    assert!(module.can_load());
    module.load();
    assert_eq!(module.state(), LoadState::Loaded);
    assert_eq!(module.progress(), 1.0);
    assert_eq!(hook_log.entries(), vec!["loaded:alpha"]);
    assert_eq!(loaded_events.load(Ordering::SeqCst), 1);

    let access = module.content_access().expect("content view while loaded");
    assert_eq!(access.asset_ids(), ["rock"]);
    assert!(access.scene("Hall").is_some());

    module.unload();
    pump_until(&dispatcher, || module.state() == LoadState::Unloaded);
    assert_eq!(module.progress(), 0.0);
    assert!(module.content_access().is_none());
    assert_eq!(hook_log.entries(), vec!["loaded:alpha", "unloaded:alpha"]);
    assert_eq!(unloaded_events.load(Ordering::SeqCst), 1);
}

#[test]
fn redundant_load_and_unload_are_idempotent() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "alpha", &[], &["rock"]);

    let dispatcher = Dispatcher::new();
    let (host, hook_log) = bindings(0);
    let registry = ModuleRegistry::new(dispatcher.clone(), host);
    registry.register_directory(root.path()).unwrap();
    let module = discover_one(&registry, &dispatcher, "alpha");

    module.unload();
    assert_eq!(module.state(), LoadState::Unloaded);

    module.load();
    module.load();
    assert_eq!(module.state(), LoadState::Loaded);
    assert_eq!(hook_log.entries(), vec!["loaded:alpha"]);
}

#[test]
fn cancelled_async_load_settles_unloaded() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "alpha", &["Hall"], &["rock"]);

    let dispatcher = Dispatcher::new();
    let (host, _) = bindings(4);
    let registry = ModuleRegistry::new(dispatcher.clone(), host);
    registry.register_directory(root.path()).unwrap();
    let module = discover_one(&registry, &dispatcher, "alpha");

    let cancelled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cancelled);
    module.connect_lifecycle(move |event| {
        if matches!(event, ResourceEvent::LoadCancelled) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    module.load_async();
    dispatcher.tick();
    dispatcher.tick();
    assert_eq!(module.state(), LoadState::Loading);

    module.unload();
    assert_eq!(module.state(), LoadState::Cancelling);

    pump_until(&dispatcher, || module.state() == LoadState::Unloaded);
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    assert_eq!(module.progress(), 0.0);
}

#[test]
fn cancel_then_resume_ends_loaded_with_one_resume_notice() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "alpha", &["Hall"], &["rock"]);

    let dispatcher = Dispatcher::new();
    let (host, _) = bindings(4);
    let registry = ModuleRegistry::new(dispatcher.clone(), host);
    registry.register_directory(root.path()).unwrap();
    let module = discover_one(&registry, &dispatcher, "alpha");

    let resumed = Arc::new(AtomicUsize::new(0));
    let cancelled = Arc::new(AtomicUsize::new(0));
    let events = (Arc::clone(&resumed), Arc::clone(&cancelled));
    module.connect_lifecycle(move |event| match event {
        ResourceEvent::LoadResumed => {
            events.0.fetch_add(1, Ordering::SeqCst);
        }
        ResourceEvent::LoadCancelled => {
            events.1.fetch_add(1, Ordering::SeqCst);
        }
        _ => {}
    });

    module.load_async();
    dispatcher.tick();
    dispatcher.tick();
    module.unload();
    assert_eq!(module.state(), LoadState::Cancelling);

    module.load_async();
    assert_eq!(module.state(), LoadState::Loading);

    pump_until(&dispatcher, || module.state() == LoadState::Loaded);
    assert_eq!(resumed.load(Ordering::SeqCst), 1);
    assert_eq!(cancelled.load(Ordering::SeqCst), 0);
}

#[test]
fn conflicting_modules_gate_each_other() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    // Both declare a scene named "Arena".
    write_module(root.path(), "alpha", &["Arena"], &[]);
    write_module(root.path(), "bravo", &["Arena"], &[]);

    let dispatcher = Dispatcher::new();
    let (host, _) = bindings(0);
    let registry = ModuleRegistry::new(dispatcher.clone(), host);
    registry.register_directory(root.path()).unwrap();
    pump_until(&dispatcher, || registry.modules().len() == 2);

    let alpha = registry.find("alpha").unwrap();
    let bravo = registry.find("bravo").unwrap();

    // Conflict discovery is pairwise but the relation is symmetric.
    assert!(alpha
        .conflicting_modules()
        .iter()
        .any(|m| Arc::ptr_eq(m, &bravo)));
    assert!(bravo
        .conflicting_modules()
        .iter()
        .any(|m| Arc::ptr_eq(m, &alpha)));

    alpha.load();
    assert_eq!(alpha.state(), LoadState::Loaded);

    assert!(!bravo.can_load());
    assert!(bravo.conflicting_loaded());
    bravo.load();
    assert_eq!(bravo.state(), LoadState::Unloaded);
    assert_eq!(bravo.progress(), 0.0);

    alpha.unload();
    pump_until(&dispatcher, || alpha.state() == LoadState::Unloaded);
    assert!(bravo.can_load());
}

#[test]
fn deferred_removal_waits_for_unload() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "alpha", &["Hall"], &["rock"]);

    let dispatcher = Dispatcher::new();
    let (host, _) = bindings(0);
    let registry = ModuleRegistry::new(dispatcher.clone(), host);
    registry.register_directory(root.path()).unwrap();
    let module = discover_one(&registry, &dispatcher, "alpha");

    module.load();
    assert_eq!(module.state(), LoadState::Loaded);

    fs::remove_dir_all(root.path().join("alpha")).unwrap();
    registry.refresh_all();

    // The loaded module must stay tracked, but is invalidated and stops
    // accepting loads.
    pump_until(&dispatcher, || !module.is_valid());
    assert_eq!(registry.modules().len(), 1);
    assert!(!module.can_load());
    assert_eq!(module.state(), LoadState::Loaded);

    module.unload();
    pump_until(&dispatcher, || registry.modules().is_empty());
}

#[test]
fn rejected_code_units_keep_the_module_unloadable() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "alpha", &[], &[]);

    let dispatcher = Dispatcher::new();
    let (host, hook_log) = rejecting_bindings();
    let registry = ModuleRegistry::new(dispatcher.clone(), host);
    registry.register_directory(root.path()).unwrap();
    let module = discover_one(&registry, &dispatcher, "alpha");

    assert!(!module.can_load());
    assert!(module
        .errors()
        .iter()
        .any(|e| e.contains("violates sandbox policy")));

    module.load();
    assert_eq!(module.state(), LoadState::Unloaded);
    assert!(hook_log.entries().is_empty());
}

#[test]
fn enabled_flag_round_trips_through_the_manifest() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    let manifest_path = write_module(root.path(), "alpha", &[], &[]);

    let dispatcher = Dispatcher::new();
    let (host, _) = bindings(0);
    let registry = ModuleRegistry::new(dispatcher.clone(), host);
    registry.register_directory(root.path()).unwrap();
    let module = discover_one(&registry, &dispatcher, "alpha");

    assert!(module.is_enabled());
    module.set_enabled(false);
    assert!(!module.is_enabled());

    let on_disk = ModuleManifest::load(&manifest_path).unwrap();
    assert!(!on_disk.enabled);
}

#[test]
fn progress_is_monotonic_through_an_async_load() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "alpha", &["Hall", "Cellar"], &["rock"]);

    let dispatcher = Dispatcher::new();
    let (host, _) = bindings(3);
    let registry = ModuleRegistry::new(dispatcher.clone(), host);
    registry.register_directory(root.path()).unwrap();
    let module = discover_one(&registry, &dispatcher, "alpha");

    let last = Arc::new(Mutex::new(0.0f32));
    let seen = Arc::clone(&last);
    module.connect_lifecycle(move |event| {
        if let ResourceEvent::Progress(p) = event {
            let mut last = seen.lock().unwrap();
            assert!(*p >= *last, "progress went backwards: {p} < {last}");
            *last = *p;
        }
    });

    module.load_async();
    pump_until(&dispatcher, || module.state() == LoadState::Loaded);
    assert_eq!(*last.lock().unwrap(), 1.0);
}
