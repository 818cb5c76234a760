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

//! Primitives for event-driven communication.
//!
//! Two complementary pieces live here. The [`EventBus`] is a generic MPSC
//! channel used to funnel events produced on background threads toward a
//! single consumer. The [`Hook`] is an ordered callback list the consumer
//! fires on its own thread, which is how host-facing notifications keep the
//! "never concurrent, always in mutation order" guarantee.

mod bus;
mod hook;

pub use bus::EventBus;
pub use hook::Hook;
