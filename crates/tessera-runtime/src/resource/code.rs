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

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::host::{CodeHost, CodeValidator, LoadedUnit, ModuleHandler};
use tessera_core::resource::{ResourceWork, WorkStep};

/// The file extension of exported code units.
pub const UNIT_EXTENSION: &str = "unit";

/// The code resource body: a module's set of code unit files.
///
/// Units are collected and validated once at construction. Validation errors
/// gate the owning resource permanently; they only clear when discovery
/// rebuilds the module after its files change.
pub struct CodeWork {
    unit_paths: Vec<PathBuf>,
    host: Arc<dyn CodeHost>,
    units: Vec<LoadedUnit>,
    load_errors: Vec<String>,
}

impl CodeWork {
    /// Collects and validates the code units under `module_dir`.
    ///
    /// Returns the body together with the validation messages to record on
    /// the owning resource. An empty unit set is itself a validation error,
    /// since the module declared code content.
    pub fn discover(
        module_dir: &Path,
        validator: &Arc<dyn CodeValidator>,
        host: Arc<dyn CodeHost>,
    ) -> (Self, Vec<String>) {
        let unit_paths = find_units(module_dir);

        let mut errors = Vec::new();
        if unit_paths.is_empty() {
            errors.push(format!(
                "No code units found under '{}'.",
                module_dir.display()
            ));
        } else {
            errors.extend(validator.validate(&unit_paths));
        }

        (
            Self {
                unit_paths,
                host,
                units: Vec::new(),
                load_errors: Vec::new(),
            },
            errors,
        )
    }

    /// The file names of this module's code units.
    pub fn unit_names(&self) -> Vec<String> {
        self.unit_paths
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }

    /// Whether every collected unit file is still present on disk.
    pub fn units_present(&self) -> bool {
        !self.unit_paths.is_empty() && self.unit_paths.iter().all(|p| p.exists())
    }

    /// Moves the handler instances registered by the loaded units out of
    /// the body. The caller owns them until unload.
    pub fn drain_handlers(&mut self) -> Vec<Box<dyn ModuleHandler>> {
        self.units
            .iter_mut()
            .flat_map(|unit| unit.handlers.drain(..))
            .collect()
    }

    /// Takes the errors reported by the host during the last load pass.
    pub fn take_load_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.load_errors)
    }
}

impl ResourceWork for CodeWork {
    fn load_step(&mut self) -> WorkStep {
        // Code loading is a single blocking call into the host.
        let outcome = self.host.load(&self.unit_paths);
        self.units = outcome.units;
        self.load_errors = outcome.errors;
        WorkStep::Done
    }

    fn unload_step(&mut self) -> WorkStep {
        if !self.units.is_empty() {
            self.host.unload(std::mem::take(&mut self.units));
        }
        WorkStep::Done
    }
}

impl std::fmt::Debug for CodeWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeWork")
            .field("unit_paths", &self.unit_paths)
            .field("loaded_units", &self.units.len())
            .finish()
    }
}

fn find_units(module_dir: &Path) -> Vec<PathBuf> {
    let mut units: Vec<PathBuf> = walkdir::WalkDir::new(module_dir)
        .follow_links(false)
        .max_depth(4)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext == UNIT_EXTENSION)
        })
        .map(|entry| entry.into_path())
        .collect();
    units.sort();
    units
}
