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

//! The asynchronous load/unload state machine governing every loadable unit.
//!
//! A [`Resource`] pairs a small, explicit state machine with a [`ResourceWork`]
//! body that performs the actual loading in cooperative steps. The machine is
//! driven either to completion on the calling context ([`Resource::load`]) or
//! one step at a time by an external tick loop ([`Resource::load_async`] +
//! [`Resource::tick`]), which is how the dispatcher keeps long loads from
//! blocking the designated thread.
//!
//! Cancellation is cooperative: unloading a resource mid-load moves it to
//! [`LoadState::Cancelling`] while the in-flight work keeps running; only the
//! outcome is redirected once the work completes. Requesting a load again
//! before that happens resumes the original pass instead of restarting it.

mod machine;

pub use machine::Resource;

/// The load state of a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing is loaded. The initial and terminal resting state.
    Unloaded,
    /// A load pass is in progress.
    Loading,
    /// The resource is fully loaded.
    Loaded,
    /// A load pass is still running but its result will be discarded
    /// unless the load is resumed before the work completes.
    Cancelling,
    /// An unload pass is in progress.
    Unloading,
}

impl LoadState {
    /// Returns `true` while a load or unload pass is in flight.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            LoadState::Loading | LoadState::Cancelling | LoadState::Unloading
        )
    }
}

/// The outcome of driving one unit of load or unload work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkStep {
    /// More work remains; the value is the overall progress in `0..1`.
    Pending(f32),
    /// The pass has finished.
    Done,
}

/// A notification raised by a [`Resource`] state transition.
///
/// Notifications are returned to the caller that drove the transition rather
/// than delivered through callbacks, so the owner decides on which thread and
/// in which order observers run.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    /// The resource finished loading.
    Loaded,
    /// The resource finished unloading.
    Unloaded,
    /// A cancelled load pass ran to completion and was discarded.
    LoadCancelled,
    /// A cancelled load pass was resumed before its work completed.
    LoadResumed,
    /// The load progress changed. Monotonic within a single pass.
    Progress(f32),
}

/// The body of a [`Resource`]: the actual loading and unloading work,
/// expressed as explicit cooperative steps.
///
/// `load_step` is invoked repeatedly (once per tick for async loads, in a
/// tight loop for blocking loads) until it reports [`WorkStep::Done`]. The
/// same applies to `unload_step`. Implementations must tolerate an unload
/// pass starting after a partially-completed load pass and vice versa; the
/// machine guarantees the two are never interleaved within one pass.
pub trait ResourceWork: Send {
    /// Drives one unit of loading. Progress values must be monotonic
    /// within a pass.
    fn load_step(&mut self) -> WorkStep;

    /// Drives one unit of unloading.
    fn unload_step(&mut self) -> WorkStep;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_states() {
        assert!(!LoadState::Unloaded.is_busy());
        assert!(!LoadState::Loaded.is_busy());
        assert!(LoadState::Loading.is_busy());
        assert!(LoadState::Cancelling.is_busy());
        assert!(LoadState::Unloading.is_busy());
    }
}
