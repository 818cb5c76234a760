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

//! # Tessera Core
//!
//! Foundational crate containing traits, core types, and interface contracts
//! that define the module system's architecture.

#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod host;
pub mod manifest;
pub mod resource;

pub use manifest::ModuleManifest;
pub use resource::{LoadState, Resource, ResourceEvent, ResourceWork, WorkStep};
