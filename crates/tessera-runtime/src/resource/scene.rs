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

use super::bundle::read_sidecar;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::host::{SceneHandle, SceneHost, SceneLoading};
use tessera_core::resource::{ResourceWork, WorkStep};

struct SceneSlot {
    name: String,
    in_flight: Option<Box<dyn SceneLoading>>,
    handle: Option<SceneHandle>,
}

/// The scene-set resource body: every scene the module's scenes bundle
/// declares, loaded one after another with combined progress.
///
/// Unloading tears scenes down through [`SceneHost::unload`], which blocks
/// per scene until the host reports the scene fully gone. A resumed load
/// only re-drives scenes that have no handle; scenes that survived a
/// partial teardown stay as they are.
pub struct SceneSetWork {
    bundle_path: PathBuf,
    host: Arc<dyn SceneHost>,
    slots: Vec<SceneSlot>,
}

impl SceneSetWork {
    /// Opens the scenes bundle description at `path`, reading the scene
    /// names from its sidecar.
    ///
    /// Returns the body and the validation errors to record on the owning
    /// resource.
    pub fn open(path: PathBuf, host: Arc<dyn SceneHost>) -> (Self, Vec<String>) {
        let (names, errors) = read_sidecar(&path);
        let slots = names
            .into_iter()
            .map(|name| SceneSlot {
                name,
                in_flight: None,
                handle: None,
            })
            .collect();

        (
            Self {
                bundle_path: path,
                host,
                slots,
            },
            errors,
        )
    }

    /// The names of the scenes in this set, known before any load.
    pub fn scene_names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.name.clone()).collect()
    }

    /// Whether the scenes bundle file is still present on disk.
    pub fn bundle_present(&self) -> bool {
        self.bundle_path.exists()
    }

    /// The handles of the currently active scenes, paired with their names.
    pub fn active_scenes(&self) -> Vec<(String, SceneHandle)> {
        self.slots
            .iter()
            .filter_map(|s| s.handle.map(|h| (s.name.clone(), h)))
            .collect()
    }
}

impl ResourceWork for SceneSetWork {
    fn load_step(&mut self) -> WorkStep {
        let total = self.slots.len();
        if total == 0 {
            return WorkStep::Done;
        }

        let done = self.slots.iter().filter(|s| s.handle.is_some()).count();

        let Some(slot) = self.slots.iter_mut().find(|s| s.handle.is_none()) else {
            return WorkStep::Done;
        };

        let ticket = slot
            .in_flight
            .get_or_insert_with(|| self.host.begin_load(&slot.name));

        match ticket.step() {
            WorkStep::Pending(p) => WorkStep::Pending((done as f32 + p) / total as f32),
            WorkStep::Done => {
                slot.handle = ticket.take();
                slot.in_flight = None;
                if self.slots.iter().all(|s| s.handle.is_some()) {
                    WorkStep::Done
                } else {
                    WorkStep::Pending((done + 1) as f32 / total as f32)
                }
            }
        }
    }

    fn unload_step(&mut self) -> WorkStep {
        // One scene per step; the host blocks until that scene is gone.
        for slot in &mut self.slots {
            slot.in_flight = None;
        }

        let Some(slot) = self.slots.iter_mut().rev().find(|s| s.handle.is_some()) else {
            return WorkStep::Done;
        };

        if let Some(handle) = slot.handle.take() {
            self.host.unload(handle);
        }

        if self.slots.iter().any(|s| s.handle.is_some()) {
            let remaining = self.slots.iter().filter(|s| s.handle.is_some()).count();
            WorkStep::Pending(1.0 - remaining as f32 / self.slots.len() as f32)
        } else {
            WorkStep::Done
        }
    }
}

impl std::fmt::Debug for SceneSetWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneSetWork")
            .field("bundle_path", &self.bundle_path)
            .field("scenes", &self.scene_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    struct StubLoading {
        steps: u32,
        handle: SceneHandle,
    }
    impl SceneLoading for StubLoading {
        fn step(&mut self) -> WorkStep {
            if self.steps > 0 {
                self.steps -= 1;
                WorkStep::Pending(0.5)
            } else {
                WorkStep::Done
            }
        }
        fn take(&mut self) -> Option<SceneHandle> {
            Some(self.handle)
        }
    }

    struct StubHost {
        next_handle: AtomicU64,
        unloads: AtomicUsize,
    }
    impl StubHost {
        fn new() -> Self {
            Self {
                next_handle: AtomicU64::new(1),
                unloads: AtomicUsize::new(0),
            }
        }
    }
    impl SceneHost for StubHost {
        fn begin_load(&self, _scene: &str) -> Box<dyn SceneLoading> {
            Box::new(StubLoading {
                steps: 1,
                handle: SceneHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)),
            })
        }
        fn unload(&self, _scene: SceneHandle) {
            self.unloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn scene_bundle(dir: &Path, names: &[&str]) -> PathBuf {
        let path = dir.join("alpha.scenes");
        fs::write(&path, b"bundle").unwrap();
        let listed: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        fs::write(
            PathBuf::from(format!("{}.manifest", path.display())),
            serde_json::to_string(&serde_json::json!({ "assets": listed })).unwrap(),
        )
        .unwrap();
        path
    }

    #[test]
    fn scenes_load_sequentially_with_combined_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = scene_bundle(dir.path(), &["Arena", "Lobby"]);
        let host = Arc::new(StubHost::new());
        let (mut work, errors) = SceneSetWork::open(path, host);

        assert!(errors.is_empty());
        assert_eq!(work.scene_names(), vec!["Arena", "Lobby"]);

        let mut last = 0.0;
        loop {
            match work.load_step() {
                WorkStep::Pending(p) => {
                    assert!(p >= last);
                    last = p;
                }
                WorkStep::Done => break,
            }
        }
        assert_eq!(work.active_scenes().len(), 2);
    }

    #[test]
    fn teardown_is_one_scene_per_step_in_reverse_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = scene_bundle(dir.path(), &["Arena", "Lobby"]);
        let host = Arc::new(StubHost::new());
        let (mut work, _) = SceneSetWork::open(path, Arc::clone(&host) as _);

        while work.load_step() != WorkStep::Done {}

        assert!(matches!(work.unload_step(), WorkStep::Pending(_)));
        let remaining = work.active_scenes();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, "Arena");

        assert_eq!(work.unload_step(), WorkStep::Done);
        assert_eq!(host.unloads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn resume_reloads_only_torn_down_scenes() {
        let dir = tempfile::tempdir().unwrap();
        let path = scene_bundle(dir.path(), &["Arena", "Lobby"]);
        let host = Arc::new(StubHost::new());
        let (mut work, _) = SceneSetWork::open(path, host);

        while work.load_step() != WorkStep::Done {}
        work.unload_step();
        assert_eq!(work.active_scenes().len(), 1);

        while work.load_step() != WorkStep::Done {}
        assert_eq!(work.active_scenes().len(), 2);
    }

    #[test]
    fn empty_scene_set_loads_trivially() {
        let dir = tempfile::tempdir().unwrap();
        let path = scene_bundle(dir.path(), &[]);
        let (mut work, _) = SceneSetWork::open(path, Arc::new(StubHost::new()));
        assert_eq!(work.load_step(), WorkStep::Done);
        assert_eq!(work.unload_step(), WorkStep::Done);
    }
}
