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

//! The collaborator boundary between the module system and the host.
//!
//! The module system never executes, verifies, or instantiates module
//! content itself. Everything that touches real code units, asset bundles,
//! or scenes is delegated through the traits in this module; the engine only
//! orchestrates *when* those operations run and what their outcomes mean for
//! module state. Hosts provide one implementation of each trait in a
//! [`HostBindings`] when constructing the registry.

use crate::resource::WorkStep;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An opaque handle to a scene the host has made active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneHandle(pub u64);

/// An opaque handle to an asset bundle the host has opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BundleHandle(pub u64);

/// Static verification of code units against the host's sandboxing policy.
///
/// Called once per code resource before it is considered loadable; a
/// non-empty result marks the resource as permanently unloadable until its
/// backing files change and discovery re-validates it.
pub trait CodeValidator: Send + Sync {
    /// Validates the given unit files, returning one message per violation.
    fn validate(&self, unit_paths: &[PathBuf]) -> Vec<String>;
}

/// A code unit the host has loaded into the process.
///
/// Handlers are registered explicitly by the unit when it is loaded; this is
/// the plug-in registration point that replaces runtime type scanning.
pub struct LoadedUnit {
    /// The unit's name (its file stem).
    pub name: String,
    /// Handler instances the unit registered during load.
    pub handlers: Vec<Box<dyn ModuleHandler>>,
}

impl std::fmt::Debug for LoadedUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedUnit")
            .field("name", &self.name)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// The outcome of loading a set of code units.
#[derive(Debug, Default)]
pub struct CodeLoadOutcome {
    /// The units that loaded, in input order.
    pub units: Vec<LoadedUnit>,
    /// One message per unit that failed to load.
    pub errors: Vec<String>,
}

/// Loads and unloads code units in the host process.
pub trait CodeHost: Send + Sync {
    /// Loads the given unit files, blocking until done.
    fn load(&self, unit_paths: &[PathBuf]) -> CodeLoadOutcome;

    /// Releases previously loaded units.
    fn unload(&self, units: Vec<LoadedUnit>);
}

/// An asset bundle the host has opened, together with the identifiers of the
/// assets it contains.
#[derive(Debug)]
pub struct LoadedBundle {
    /// The handle the host uses to refer to the open bundle.
    pub handle: BundleHandle,
    /// Identifiers of every asset contained in the bundle.
    pub asset_ids: Vec<String>,
}

/// An in-flight asset bundle load.
pub trait BundleLoading: Send {
    /// Drives the load forward. Progress values must be monotonic.
    fn step(&mut self) -> WorkStep;

    /// The loaded bundle, available once [`BundleLoading::step`] has
    /// returned [`WorkStep::Done`].
    fn take(&mut self) -> Option<LoadedBundle>;
}

/// Opens and releases asset bundle files.
pub trait BundleHost: Send + Sync {
    /// Begins loading the bundle at `path`.
    fn begin_load(&self, path: &Path) -> Box<dyn BundleLoading>;

    /// Releases an open bundle and everything loaded from it.
    fn unload(&self, bundle: LoadedBundle);
}

/// An in-flight scene load.
pub trait SceneLoading: Send {
    /// Drives the load forward. Progress values must be monotonic.
    fn step(&mut self) -> WorkStep;

    /// The active scene's handle, available once [`SceneLoading::step`]
    /// has returned [`WorkStep::Done`].
    fn take(&mut self) -> Option<SceneHandle>;
}

/// Loads and tears down scenes by name.
pub trait SceneHost: Send + Sync {
    /// Begins loading the named scene.
    fn begin_load(&self, scene: &str) -> Box<dyn SceneLoading>;

    /// Tears the scene down, blocking until it is fully gone.
    fn unload(&self, scene: SceneHandle);
}

/// A hook a module's code registers to run when its module finishes loading
/// or begins unloading.
///
/// A failing hook is logged and never aborts the remaining hooks or the
/// surrounding load/unload pass.
pub trait ModuleHandler: Send {
    /// Called once the owning module is fully loaded.
    fn on_loaded(&mut self, content: &ContentAccess) -> anyhow::Result<()>;

    /// Called when the owning module begins unloading.
    fn on_unloaded(&mut self) -> anyhow::Result<()>;
}

/// A read-only view of a loaded module's content, handed to
/// [`ModuleHandler::on_loaded`] and queryable from the module itself.
#[derive(Debug, Default)]
pub struct ContentAccess {
    assets: Vec<String>,
    scenes: Vec<(String, SceneHandle)>,
    bundle: Option<BundleHandle>,
}

impl ContentAccess {
    /// Builds a view over the given loaded content.
    pub fn new(
        assets: Vec<String>,
        scenes: Vec<(String, SceneHandle)>,
        bundle: Option<BundleHandle>,
    ) -> Self {
        Self {
            assets,
            scenes,
            bundle,
        }
    }

    /// The identifiers of every asset in the module's bundle.
    pub fn asset_ids(&self) -> &[String] {
        &self.assets
    }

    /// Looks up an asset identifier by exact name.
    pub fn find_asset(&self, name: &str) -> Option<&str> {
        self.assets
            .iter()
            .find(|id| id.as_str() == name)
            .map(String::as_str)
    }

    /// The handle of the named scene, if that scene is active.
    pub fn scene(&self, name: &str) -> Option<SceneHandle> {
        self.scenes
            .iter()
            .find(|(scene, _)| scene == name)
            .map(|(_, handle)| *handle)
    }

    /// The handle of the module's open asset bundle, if any.
    pub fn bundle(&self) -> Option<BundleHandle> {
        self.bundle
    }
}

/// The full set of collaborators a host supplies to the module system.
#[derive(Clone)]
pub struct HostBindings {
    /// Static code verification.
    pub validator: Arc<dyn CodeValidator>,
    /// Code unit loading.
    pub code: Arc<dyn CodeHost>,
    /// Asset bundle loading.
    pub bundles: Arc<dyn BundleHost>,
    /// Scene loading.
    pub scenes: Arc<dyn SceneHost>,
}

impl std::fmt::Debug for HostBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HostBindings { .. }")
    }
}
