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

//! The serialized metadata record identifying and describing a module.
//!
//! Manifests are JSON documents with the [`MANIFEST_EXTENSION`] extension,
//! placed by the export pipeline next to the module's platform directories.
//! Everything in a manifest is immutable after export except the `enabled`
//! flag, which the host toggles and persists through [`ModuleManifest::save`].

mod content;
mod platform;

pub use content::{ContentFlags, ContentKind};
pub use platform::{Platform, PlatformFlags};

use crate::error::ManifestError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The file extension module manifests are discovered by.
pub const MANIFEST_EXTENSION: &str = "tessera";

/// A module's manifest: name, author, description, version, supported
/// platforms, declared content kinds, and the persisted enabled flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// The module's name. Also names the exported bundle files.
    pub name: String,

    /// The module's author.
    #[serde(default)]
    pub author: String,

    /// A free-form description of the module.
    #[serde(default)]
    pub description: String,

    /// The module's version string.
    #[serde(default)]
    pub version: String,

    /// The platforms this module was exported for.
    #[serde(default)]
    pub platforms: PlatformFlags,

    /// The kinds of content this module bundles.
    #[serde(default)]
    pub content: ContentFlags,

    /// Whether the host should offer this module for loading. The only
    /// mutable, persisted field.
    #[serde(default)]
    pub enabled: bool,

    /// The manifest's on-disk location. Not serialized; recorded at load.
    #[serde(skip)]
    pub path: PathBuf,
}

impl ModuleManifest {
    /// Loads a manifest from `path`.
    ///
    /// # Errors
    /// Returns [`ManifestError::Io`] when the file cannot be read and
    /// [`ManifestError::Parse`] when it is not a valid manifest document.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut manifest: ModuleManifest =
            serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        manifest.path = path.to_path_buf();
        Ok(manifest)
    }

    /// Persists this manifest back to the file it was loaded from. Only the
    /// `enabled` flag ever changes after export; the rest is rewritten
    /// verbatim.
    ///
    /// # Errors
    /// Returns [`ManifestError::NoPath`] for a manifest that was never
    /// loaded from disk, or [`ManifestError::Io`] when writing fails.
    pub fn save(&self) -> Result<(), ManifestError> {
        if self.path.as_os_str().is_empty() {
            return Err(ManifestError::NoPath);
        }

        let text = serde_json::to_string_pretty(self).expect("manifest serialization is infallible");

        fs::write(&self.path, text).map_err(|source| ManifestError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// The directory the manifest sits in, which is the module's root.
    pub fn module_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}
