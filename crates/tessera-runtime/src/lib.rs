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

//! # Tessera Runtime
//!
//! The module discovery and lifecycle orchestration engine: background
//! directory watching, cross-thread dispatch onto one designated thread,
//! the concrete code/bundle/scene resources, module composition with
//! conflict gating, and the registry that ties them together.

pub mod dispatcher;
pub mod module;
pub mod registry;
pub mod resource;
pub mod watch;

pub use dispatcher::{Dispatcher, TaskStep};
pub use module::Module;
pub use registry::ModuleRegistry;
pub use watch::{DirectoryWatcher, WatchConfig, WatchEvent};
