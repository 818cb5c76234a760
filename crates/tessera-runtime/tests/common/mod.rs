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

//! Shared fixtures: stub host collaborators and on-disk module layouts.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tessera_core::host::{
    BundleHandle, BundleHost, BundleLoading, CodeHost, CodeLoadOutcome, CodeValidator,
    ContentAccess, HostBindings, LoadedBundle, LoadedUnit, ModuleHandler, SceneHandle, SceneHost,
    SceneLoading,
};
use tessera_core::manifest::Platform;
use tessera_core::resource::WorkStep;
use tessera_runtime::Dispatcher;

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A shared, ordered record of handler hook invocations.
#[derive(Default)]
pub struct HookLog(Mutex<Vec<String>>);

impl HookLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct OkValidator;
impl CodeValidator for OkValidator {
    fn validate(&self, _unit_paths: &[PathBuf]) -> Vec<String> {
        Vec::new()
    }
}

struct RejectingValidator;
impl CodeValidator for RejectingValidator {
    fn validate(&self, unit_paths: &[PathBuf]) -> Vec<String> {
        unit_paths
            .iter()
            .map(|p| format!("unit '{}' violates sandbox policy", p.display()))
            .collect()
    }
}

struct LoggingHandler {
    unit: String,
    log: Arc<HookLog>,
}

impl ModuleHandler for LoggingHandler {
    fn on_loaded(&mut self, _content: &ContentAccess) -> anyhow::Result<()> {
        self.log.push(format!("loaded:{}", self.unit));
        Ok(())
    }

    fn on_unloaded(&mut self) -> anyhow::Result<()> {
        self.log.push(format!("unloaded:{}", self.unit));
        Ok(())
    }
}

struct StubCodeHost {
    log: Arc<HookLog>,
}

impl CodeHost for StubCodeHost {
    fn load(&self, unit_paths: &[PathBuf]) -> CodeLoadOutcome {
        CodeLoadOutcome {
            units: unit_paths
                .iter()
                .map(|path| {
                    let unit = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    LoadedUnit {
                        name: unit.clone(),
                        handlers: vec![Box::new(LoggingHandler {
                            unit,
                            log: Arc::clone(&self.log),
                        })],
                    }
                })
                .collect(),
            errors: Vec::new(),
        }
    }

    fn unload(&self, _units: Vec<LoadedUnit>) {}
}

struct StubBundleLoading {
    remaining: u32,
    total: u32,
}

impl BundleLoading for StubBundleLoading {
    fn step(&mut self) -> WorkStep {
        if self.remaining > 0 {
            self.remaining -= 1;
            WorkStep::Pending(1.0 - self.remaining as f32 / self.total as f32)
        } else {
            WorkStep::Done
        }
    }

    fn take(&mut self) -> Option<LoadedBundle> {
        Some(LoadedBundle {
            handle: BundleHandle(1),
            asset_ids: Vec::new(),
        })
    }
}

struct StubBundleHost {
    steps: u32,
}

impl BundleHost for StubBundleHost {
    fn begin_load(&self, _path: &Path) -> Box<dyn BundleLoading> {
        Box::new(StubBundleLoading {
            remaining: self.steps,
            total: self.steps.max(1),
        })
    }

    fn unload(&self, _bundle: LoadedBundle) {}
}

struct StubSceneLoading {
    remaining: u32,
    handle: SceneHandle,
}

impl SceneLoading for StubSceneLoading {
    fn step(&mut self) -> WorkStep {
        if self.remaining > 0 {
            self.remaining -= 1;
            WorkStep::Pending(0.5)
        } else {
            WorkStep::Done
        }
    }

    fn take(&mut self) -> Option<SceneHandle> {
        Some(self.handle)
    }
}

struct StubSceneHost {
    steps: u32,
    next_handle: AtomicU64,
}

impl SceneHost for StubSceneHost {
    fn begin_load(&self, _scene: &str) -> Box<dyn SceneLoading> {
        Box::new(StubSceneLoading {
            remaining: self.steps,
            handle: SceneHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)),
        })
    }

    fn unload(&self, _scene: SceneHandle) {}
}

/// Stub collaborators that accept everything, plus the hook log they feed.
pub fn bindings(load_steps: u32) -> (HostBindings, Arc<HookLog>) {
    let log = Arc::new(HookLog::default());
    let bindings = HostBindings {
        validator: Arc::new(OkValidator),
        code: Arc::new(StubCodeHost {
            log: Arc::clone(&log),
        }),
        bundles: Arc::new(StubBundleHost { steps: load_steps }),
        scenes: Arc::new(StubSceneHost {
            steps: load_steps,
            next_handle: AtomicU64::new(1),
        }),
    };
    (bindings, log)
}

/// Like [`bindings`], but with a validator that rejects every unit.
pub fn rejecting_bindings() -> (HostBindings, Arc<HookLog>) {
    let (mut bindings, log) = bindings(0);
    bindings.validator = Arc::new(RejectingValidator);
    (bindings, log)
}

/// Writes a complete module layout: manifest, code unit, and per-platform
/// asset/scene bundles with their sidecars. Returns the manifest path.
pub fn write_module(root: &Path, name: &str, scenes: &[&str], assets: &[&str]) -> PathBuf {
    let dir = root.join(name);
    let platform_dir = dir.join(Platform::current().expect("test platform").dir_name());
    fs::create_dir_all(&platform_dir).unwrap();

    fs::write(dir.join(format!("{name}.unit")), b"unit").unwrap();

    let stem = name.to_lowercase();
    write_bundle(&platform_dir.join(format!("{stem}.assets")), assets);
    write_bundle(&platform_dir.join(format!("{stem}.scenes")), scenes);

    let manifest = dir.join(format!("{name}.tessera"));
    fs::write(
        &manifest,
        serde_json::to_string_pretty(&serde_json::json!({
            "name": name,
            "author": "tests",
            "version": "1.0",
            "platforms": ["windows", "linux", "macos"],
            "content": ["scenes", "assets", "code"],
            "enabled": true,
        }))
        .unwrap(),
    )
    .unwrap();
    manifest
}

fn write_bundle(path: &Path, ids: &[&str]) {
    fs::write(path, b"bundle").unwrap();
    let listed: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
    fs::write(
        PathBuf::from(format!("{}.manifest", path.display())),
        serde_json::to_string(&serde_json::json!({ "assets": listed })).unwrap(),
    )
    .unwrap();
}

/// Ticks the dispatcher until `pred` holds, panicking after five seconds.
pub fn pump_until(dispatcher: &Dispatcher, mut pred: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        dispatcher.tick();
        if pred() {
            return;
        }
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}
