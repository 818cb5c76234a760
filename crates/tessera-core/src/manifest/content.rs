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

//! Kinds of content a module can declare.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A kind of loadable content a module can bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Scene definitions.
    Scenes,
    /// An asset bundle.
    Assets,
    /// Code units.
    Code,
}

impl ContentKind {
    const ALL: [ContentKind; 3] = [ContentKind::Scenes, ContentKind::Assets, ContentKind::Code];

    const fn bit(self) -> u8 {
        match self {
            ContentKind::Scenes => 1 << 0,
            ContentKind::Assets => 1 << 1,
            ContentKind::Code => 1 << 2,
        }
    }
}

/// The set of content kinds a module declares.
///
/// Serialized in the manifest as an array of kind names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentFlags {
    bits: u8,
}

impl ContentFlags {
    /// No content.
    pub const NONE: Self = Self { bits: 0 };
    /// Every content kind.
    pub const ALL: Self = Self { bits: 0b111 };

    /// Creates a set containing a single kind.
    pub const fn from_kind(kind: ContentKind) -> Self {
        Self { bits: kind.bit() }
    }

    /// Returns `true` if the set contains `kind`.
    pub const fn contains(&self, kind: ContentKind) -> bool {
        (self.bits & kind.bit()) != 0
    }

    /// Inserts `kind` into the set.
    pub fn insert(&mut self, kind: ContentKind) {
        self.bits |= kind.bit();
    }

    /// Returns a new set with `kind` inserted.
    #[must_use]
    pub const fn with(mut self, kind: ContentKind) -> Self {
        self.bits |= kind.bit();
        self
    }

    /// Returns `true` if the set is empty.
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Iterates over the kinds in the set.
    pub fn iter(&self) -> impl Iterator<Item = ContentKind> + '_ {
        ContentKind::ALL.iter().copied().filter(|k| self.contains(*k))
    }
}

impl std::fmt::Debug for ContentFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<ContentKind> for ContentFlags {
    fn from_iter<I: IntoIterator<Item = ContentKind>>(iter: I) -> Self {
        let mut flags = Self::NONE;
        for kind in iter {
            flags.insert(kind);
        }
        flags
    }
}

impl Serialize for ContentFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for ContentFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kinds = Vec::<ContentKind>::deserialize(deserializer)?;
        Ok(kinds.into_iter().collect())
    }
}
