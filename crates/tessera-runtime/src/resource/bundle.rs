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

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::host::{BundleHost, BundleLoading, LoadedBundle};
use tessera_core::resource::{ResourceWork, WorkStep};

/// The sidecar document the export pipeline writes next to every bundle,
/// listing the identifiers of its contents.
#[derive(Debug, Deserialize)]
struct BundleSidecar {
    assets: Vec<String>,
}

/// Reads the identifiers listed in a bundle's `.manifest` sidecar.
///
/// Returns the identifiers and the validation errors to record: a bundle
/// without its sidecar cannot be offered for loading, since the engine would
/// have no way to know what it contains or what it conflicts with.
pub fn read_sidecar(bundle_path: &Path) -> (Vec<String>, Vec<String>) {
    if !bundle_path.exists() {
        return (
            Vec::new(),
            vec![format!("Bundle missing: '{}'.", bundle_path.display())],
        );
    }

    match try_read_sidecar(&sidecar_path(bundle_path)) {
        Ok(ids) => (ids, Vec::new()),
        Err(e) => (Vec::new(), vec![format!("Bundle sidecar unusable: {e:#}.")]),
    }
}

fn try_read_sidecar(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?;
    let sidecar: BundleSidecar =
        serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    Ok(sidecar.assets)
}

fn sidecar_path(bundle_path: &Path) -> PathBuf {
    let mut name = bundle_path.as_os_str().to_owned();
    name.push(".manifest");
    PathBuf::from(name)
}

/// The asset bundle resource body.
///
/// The contained asset identifiers are read from the sidecar at
/// construction so they are known (for conflict checks and host queries)
/// without loading the bundle itself.
pub struct BundleWork {
    path: PathBuf,
    host: Arc<dyn BundleHost>,
    asset_ids: Vec<String>,
    in_flight: Option<Box<dyn BundleLoading>>,
    loaded: Option<LoadedBundle>,
}

impl BundleWork {
    /// Opens the bundle description at `path`, reading its sidecar.
    ///
    /// Returns the body and the validation errors to record on the owning
    /// resource.
    pub fn open(path: PathBuf, host: Arc<dyn BundleHost>) -> (Self, Vec<String>) {
        let (asset_ids, errors) = read_sidecar(&path);
        (
            Self {
                path,
                host,
                asset_ids,
                in_flight: None,
                loaded: None,
            },
            errors,
        )
    }

    /// The identifiers of the assets contained in this bundle, known from
    /// the sidecar before any load.
    pub fn asset_ids(&self) -> &[String] {
        &self.asset_ids
    }

    /// Whether the bundle file is still present on disk.
    pub fn bundle_present(&self) -> bool {
        self.path.exists()
    }

    /// The loaded bundle, while this resource is loaded.
    pub fn loaded(&self) -> Option<&LoadedBundle> {
        self.loaded.as_ref()
    }
}

impl ResourceWork for BundleWork {
    fn load_step(&mut self) -> WorkStep {
        let ticket = self
            .in_flight
            .get_or_insert_with(|| self.host.begin_load(&self.path));

        match ticket.step() {
            WorkStep::Pending(p) => WorkStep::Pending(p),
            WorkStep::Done => {
                self.loaded = ticket.take();
                self.in_flight = None;
                WorkStep::Done
            }
        }
    }

    fn unload_step(&mut self) -> WorkStep {
        // Abandon a partial load outright; release a completed one.
        self.in_flight = None;
        if let Some(bundle) = self.loaded.take() {
            self.host.unload(bundle);
        }
        WorkStep::Done
    }
}

impl std::fmt::Debug for BundleWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleWork")
            .field("path", &self.path)
            .field("asset_ids", &self.asset_ids.len())
            .field("loaded", &self.loaded.is_some())
            .finish()
    }
}
