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

//! Platforms a module can declare support for.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single platform a module may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Desktop Windows.
    Windows,
    /// Desktop Linux.
    Linux,
    /// Desktop macOS.
    #[serde(rename = "macos")]
    MacOs,
    /// Android.
    Android,
}

impl Platform {
    /// The platform the host is currently running on, if it is one the
    /// module system recognizes.
    pub fn current() -> Option<Platform> {
        if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "macos") {
            Some(Platform::MacOs)
        } else if cfg!(target_os = "android") {
            Some(Platform::Android)
        } else {
            None
        }
    }

    /// The directory name the export pipeline uses for this platform's
    /// artifacts inside a module.
    pub fn dir_name(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Android => "android",
        }
    }

    const ALL: [Platform; 4] = [
        Platform::Windows,
        Platform::Linux,
        Platform::MacOs,
        Platform::Android,
    ];

    const fn bit(self) -> u8 {
        match self {
            Platform::Windows => 1 << 0,
            Platform::Linux => 1 << 1,
            Platform::MacOs => 1 << 2,
            Platform::Android => 1 << 3,
        }
    }
}

/// The set of platforms a module supports.
///
/// Serialized in the manifest as an array of platform names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlatformFlags {
    bits: u8,
}

impl PlatformFlags {
    /// No platforms.
    pub const NONE: Self = Self { bits: 0 };
    /// Every recognized platform.
    pub const ALL: Self = Self { bits: 0b1111 };

    /// Creates a set containing a single platform.
    pub const fn from_platform(platform: Platform) -> Self {
        Self {
            bits: platform.bit(),
        }
    }

    /// Returns `true` if the set contains `platform`.
    pub const fn contains(&self, platform: Platform) -> bool {
        (self.bits & platform.bit()) != 0
    }

    /// Inserts `platform` into the set.
    pub fn insert(&mut self, platform: Platform) {
        self.bits |= platform.bit();
    }

    /// Returns a new set with `platform` inserted.
    #[must_use]
    pub const fn with(mut self, platform: Platform) -> Self {
        self.bits |= platform.bit();
        self
    }

    /// Returns `true` if the set is empty.
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Returns `true` if the set includes the platform the host is
    /// currently running on.
    pub fn supports_host(&self) -> bool {
        Platform::current().is_some_and(|p| self.contains(p))
    }

    /// Iterates over the platforms in the set.
    pub fn iter(&self) -> impl Iterator<Item = Platform> + '_ {
        Platform::ALL.iter().copied().filter(|p| self.contains(*p))
    }
}

impl std::fmt::Debug for PlatformFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Platform> for PlatformFlags {
    fn from_iter<I: IntoIterator<Item = Platform>>(iter: I) -> Self {
        let mut flags = Self::NONE;
        for platform in iter {
            flags.insert(platform);
        }
        flags
    }
}

impl Serialize for PlatformFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for PlatformFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let platforms = Vec::<Platform>::deserialize(deserializer)?;
        Ok(platforms.into_iter().collect())
    }
}
