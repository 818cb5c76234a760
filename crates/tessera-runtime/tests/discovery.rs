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

//! End-to-end discovery: watcher threads through the intake into the
//! registry, with events observed on the dispatcher thread.

mod common;

use common::{bindings, init_logs, pump_until, write_module};
use std::fs;
use std::sync::{Arc, Mutex};
use tessera_runtime::{Dispatcher, ModuleRegistry};

fn collect_names(registry: &ModuleRegistry) -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
    let found = Arc::new(Mutex::new(Vec::new()));
    let removed = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&found);
    registry.on_module_found(move |module| sink.lock().unwrap().push(module.name().to_string()));
    let sink = Arc::clone(&removed);
    registry.on_module_removed(move |module| sink.lock().unwrap().push(module.name().to_string()));

    (found, removed)
}

#[test]
fn modules_present_before_and_added_after_are_both_found() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "alpha", &["Hall"], &["rock"]);

    let dispatcher = Dispatcher::new();
    let (host, _) = bindings(1);
    let registry = ModuleRegistry::new(dispatcher.clone(), host);
    let (found, _) = collect_names(&registry);

    registry.register_directory(root.path()).unwrap();
    pump_until(&dispatcher, || found.lock().unwrap().contains(&"alpha".to_string()));

    write_module(root.path(), "beta", &["Cellar"], &[]);
    registry.refresh_all();
    pump_until(&dispatcher, || found.lock().unwrap().contains(&"beta".to_string()));

    assert_eq!(*found.lock().unwrap(), vec!["alpha", "beta"]);
    assert_eq!(registry.modules().len(), 2);
}

#[test]
fn removing_an_unloaded_module_untracks_it() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "alpha", &[], &[]);

    let dispatcher = Dispatcher::new();
    let (host, _) = bindings(1);
    let registry = ModuleRegistry::new(dispatcher.clone(), host);
    let (found, removed) = collect_names(&registry);

    registry.register_directory(root.path()).unwrap();
    pump_until(&dispatcher, || !found.lock().unwrap().is_empty());

    fs::remove_dir_all(root.path().join("alpha")).unwrap();
    registry.refresh_all();
    pump_until(&dispatcher, || registry.modules().is_empty());

    assert_eq!(*removed.lock().unwrap(), vec!["alpha"]);
}

#[test]
fn a_corrupt_manifest_still_yields_an_invalid_module() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("broken");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("broken.tessera"), "{ not a manifest").unwrap();

    let dispatcher = Dispatcher::new();
    let (host, _) = bindings(1);
    let registry = ModuleRegistry::new(dispatcher.clone(), host);

    registry.register_directory(root.path()).unwrap();
    pump_until(&dispatcher, || !registry.modules().is_empty());

    let module = registry.find("broken").expect("invalid module tracked");
    assert!(!module.is_valid());
    assert!(!module.can_load());
    assert!(!module.errors().is_empty());
}

#[test]
fn a_changed_module_is_rebuilt() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "alpha", &["Hall"], &["rock"]);

    let dispatcher = Dispatcher::new();
    let (host, _) = bindings(1);
    let registry = ModuleRegistry::new(dispatcher.clone(), host);
    let (found, removed) = collect_names(&registry);

    registry.register_directory(root.path()).unwrap();
    pump_until(&dispatcher, || !found.lock().unwrap().is_empty());

    let before = registry.find("alpha").unwrap();
    assert_eq!(before.asset_ids(), vec!["rock"]);

    // Re-export with an extra asset. The directory tree's timestamps move,
    // so the next scan reports a change and the module is rebuilt.
    std::thread::sleep(std::time::Duration::from_millis(50));
    write_module(root.path(), "alpha", &["Hall"], &["rock", "tree"]);

    registry.refresh_all();
    pump_until(&dispatcher, || removed.lock().unwrap().len() == 1);
    pump_until(&dispatcher, || found.lock().unwrap().len() == 2);

    let after = registry.find("alpha").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.asset_ids(), vec!["rock", "tree"]);
    assert_eq!(registry.modules().len(), 1);
}

#[test]
fn unregistering_a_directory_stops_discovery_there() {
    init_logs();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "alpha", &[], &[]);

    let dispatcher = Dispatcher::new();
    let (host, _) = bindings(1);
    let registry = ModuleRegistry::new(dispatcher.clone(), host);
    let (found, _) = collect_names(&registry);

    registry.register_directory(root.path()).unwrap();
    pump_until(&dispatcher, || !found.lock().unwrap().is_empty());

    registry.unregister_directory(root.path());
    write_module(root.path(), "beta", &[], &[]);
    registry.refresh_all();

    std::thread::sleep(std::time::Duration::from_millis(200));
    dispatcher.tick();
    assert_eq!(*found.lock().unwrap(), vec!["alpha"]);
}
