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

//! Defines the error types shared across the module system.

use std::fmt;
use std::path::PathBuf;

/// An error that occurred while reading or writing a module manifest.
#[derive(Debug)]
pub enum ManifestError {
    /// The manifest file could not be read or written.
    Io {
        /// The path of the manifest involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// The manifest file exists but does not contain a valid manifest document.
    Parse {
        /// The path of the manifest involved.
        path: PathBuf,
        /// The underlying deserialization error.
        source: serde_json::Error,
    },
    /// The manifest has no file path to persist to.
    NoPath,
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestError::Io { path, source } => {
                write!(f, "Failed to access manifest '{}': {source}", path.display())
            }
            ManifestError::Parse { path, source } => {
                write!(f, "Failed to parse manifest '{}': {source}", path.display())
            }
            ManifestError::NoPath => {
                write!(f, "Manifest has no backing file path.")
            }
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ManifestError::Io { source, .. } => Some(source),
            ManifestError::Parse { source, .. } => Some(source),
            ManifestError::NoPath => None,
        }
    }
}
