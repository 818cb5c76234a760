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

use super::{LoadState, ResourceEvent, ResourceWork, WorkStep};

/// A named loadable unit governed by the load/unload state machine.
///
/// The machine owns its [`ResourceWork`] body and an append-only error list.
/// A resource with recorded errors refuses to load until the errors are
/// cleared by re-validation (which, for discovered modules, means the backing
/// files changed and the resource was rebuilt).
#[derive(Debug)]
pub struct Resource<W> {
    name: String,
    state: LoadState,
    progress: f32,
    errors: Vec<String>,
    work: W,
}

impl<W: ResourceWork> Resource<W> {
    /// Creates a new resource in the [`LoadState::Unloaded`] state.
    pub fn new(name: impl Into<String>, work: W) -> Self {
        Self {
            name: name.into(),
            state: LoadState::Unloaded,
            progress: 0.0,
            errors: Vec::new(),
            work,
        }
    }

    /// This resource's stable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current load state.
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// The current load progress in `0..1`.
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// The errors recorded against this resource, in the order they occurred.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Records a validation error. The resource will refuse to load while
    /// any error is recorded.
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Whether this resource may begin loading.
    pub fn can_load(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether a load or unload pass is in flight.
    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    /// The work body backing this resource.
    pub fn work(&self) -> &W {
        &self.work
    }

    /// Mutable access to the work body backing this resource.
    pub fn work_mut(&mut self) -> &mut W {
        &mut self.work
    }

    /// Loads this resource, blocking the calling context until the pass
    /// completes. No-op when already loaded or when [`Self::can_load`] is
    /// false.
    pub fn load(&mut self) -> Vec<ResourceEvent> {
        let mut events = Vec::new();

        match self.state {
            LoadState::Unloaded => {
                if !self.can_load() {
                    return events;
                }
                self.state = LoadState::Loading;
                self.run_load(&mut events);
            }
            LoadState::Cancelling => {
                self.resume(&mut events);
                self.run_load(&mut events);
            }
            LoadState::Unloading => self.abandon_unload(&mut events),
            LoadState::Loading | LoadState::Loaded => {}
        }

        events
    }

    /// Begins loading this resource without blocking; [`Self::tick`] drives
    /// the pass to completion. No-op when already loaded or when
    /// [`Self::can_load`] is false.
    pub fn load_async(&mut self) -> Vec<ResourceEvent> {
        let mut events = Vec::new();

        match self.state {
            LoadState::Unloaded => {
                if self.can_load() {
                    self.state = LoadState::Loading;
                }
            }
            LoadState::Cancelling => self.resume(&mut events),
            LoadState::Unloading => self.abandon_unload(&mut events),
            LoadState::Loading | LoadState::Loaded => {}
        }

        events
    }

    /// Unloads this resource. While loading, this cancels the pass
    /// cooperatively: the in-flight work keeps running and its result is
    /// discarded when it completes. No-op when already unloaded.
    pub fn unload(&mut self) -> Vec<ResourceEvent> {
        let mut events = Vec::new();

        match self.state {
            LoadState::Loading => self.state = LoadState::Cancelling,
            LoadState::Loaded => {
                self.state = LoadState::Unloading;
                self.step_unload(&mut events);
            }
            LoadState::Unloaded | LoadState::Cancelling | LoadState::Unloading => {}
        }

        events
    }

    /// Drives one step of whatever pass is in flight. Returns the raised
    /// notifications; an empty result with [`Self::is_busy`] false means
    /// there is nothing left to drive.
    pub fn tick(&mut self) -> Vec<ResourceEvent> {
        let mut events = Vec::new();

        match self.state {
            LoadState::Loading => match self.work.load_step() {
                WorkStep::Pending(p) => self.set_progress(p, &mut events),
                WorkStep::Done => self.finish_load(&mut events),
            },
            LoadState::Cancelling => match self.work.load_step() {
                WorkStep::Pending(p) => self.set_progress(p, &mut events),
                WorkStep::Done => {
                    // The discarded pass completed: tear it straight back
                    // down and report the cancellation instead of a load.
                    while let WorkStep::Pending(_) = self.work.unload_step() {}
                    self.state = LoadState::Unloaded;
                    self.progress = 0.0;
                    events.push(ResourceEvent::LoadCancelled);
                }
            },
            LoadState::Unloading => self.step_unload(&mut events),
            LoadState::Unloaded | LoadState::Loaded => {}
        }

        events
    }

    fn run_load(&mut self, events: &mut Vec<ResourceEvent>) {
        loop {
            match self.work.load_step() {
                WorkStep::Pending(p) => self.set_progress(p, events),
                WorkStep::Done => break,
            }
        }
        self.finish_load(events);
    }

    fn finish_load(&mut self, events: &mut Vec<ResourceEvent>) {
        self.state = LoadState::Loaded;
        self.set_progress(1.0, events);
        log::debug!("Resource loaded: {}", self.name);
        events.push(ResourceEvent::Loaded);
    }

    fn step_unload(&mut self, events: &mut Vec<ResourceEvent>) {
        match self.work.unload_step() {
            WorkStep::Pending(_) => {}
            WorkStep::Done => {
                self.state = LoadState::Unloaded;
                self.progress = 0.0;
                log::debug!("Resource unloaded: {}", self.name);
                events.push(ResourceEvent::Unloaded);
            }
        }
    }

    fn resume(&mut self, events: &mut Vec<ResourceEvent>) {
        // The original pass is still in flight; picking it back up costs
        // nothing and skips the duplicate work of a restart.
        self.state = LoadState::Loading;
        log::debug!("Resource load resumed: {}", self.name);
        events.push(ResourceEvent::LoadResumed);
    }

    fn abandon_unload(&mut self, events: &mut Vec<ResourceEvent>) {
        self.state = LoadState::Loaded;
        events.push(ResourceEvent::Loaded);
    }

    fn set_progress(&mut self, value: f32, events: &mut Vec<ResourceEvent>) {
        if value > self.progress {
            self.progress = value.min(1.0);
            events.push(ResourceEvent::Progress(self.progress));
        }
    }
}
