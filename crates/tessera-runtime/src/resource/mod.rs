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

//! Concrete resource bodies: code units, asset bundles, and scene sets.
//!
//! Each body implements [`tessera_core::ResourceWork`] and delegates the
//! actual loading to the host collaborators; what lives here is the
//! validation performed at construction time and the bookkeeping that turns
//! collaborator progress into state-machine steps.

mod bundle;
mod code;
mod scene;

pub use bundle::BundleWork;
pub use code::CodeWork;
pub use scene::SceneSetWork;
