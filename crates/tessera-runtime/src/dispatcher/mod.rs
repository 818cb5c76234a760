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

//! Marshals actions from any thread onto one designated execution thread.
//!
//! The dispatcher is the sole ordering guarantee in the module system:
//! actions enqueued from background threads run strictly in enqueue order on
//! the thread that created the dispatcher and calls [`Dispatcher::tick`].
//! Long-running work is registered as a stepped task that the tick loop
//! re-invokes until it reports [`TaskStep::Done`], which is how asynchronous
//! resource loads make progress without ever blocking the designated thread.

use crossbeam_channel::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

type Action = Box<dyn FnOnce() + Send>;
type Task = Box<dyn FnMut() -> TaskStep + Send>;

/// The outcome of stepping a dispatcher task once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStep {
    /// The task wants to be stepped again on the next tick.
    Again,
    /// The task is finished and can be dropped.
    Done,
}

/// A cloneable handle to the single-consumer action queue.
///
/// The thread that calls [`Dispatcher::new`] becomes the designated
/// execution thread; only that thread may call [`Dispatcher::tick`].
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

struct Shared {
    tx: Sender<Action>,
    rx: Receiver<Action>,
    main: ThreadId,
    tasks: Mutex<Vec<Task>>,
}

impl Dispatcher {
    /// Creates a dispatcher pinned to the calling thread.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            shared: Arc::new(Shared {
                tx,
                rx,
                main: thread::current().id(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Whether the calling thread is the designated execution thread.
    pub fn on_dispatch_thread(&self) -> bool {
        thread::current().id() == self.shared.main
    }

    /// Runs `action` on the designated thread. When called from that thread
    /// the action runs immediately; otherwise it is queued and runs on the
    /// next tick, after everything queued before it.
    pub fn enqueue(&self, action: impl FnOnce() + Send + 'static) {
        if self.on_dispatch_thread() {
            action();
            return;
        }
        self.enqueue_deferred(action);
    }

    /// Queues `action` for the next tick even when called from the
    /// designated thread.
    pub fn enqueue_deferred(&self, action: impl FnOnce() + Send + 'static) {
        if self.shared.tx.send(Box::new(action)).is_err() {
            log::error!("Dispatcher queue closed; dropping action.");
        }
    }

    /// Registers a stepped task. The tick loop invokes it once per tick
    /// until it returns [`TaskStep::Done`].
    pub fn add_task(&self, task: impl FnMut() -> TaskStep + Send + 'static) {
        self.shared
            .tasks
            .lock()
            .expect("dispatcher task list poisoned")
            .push(Box::new(task));
    }

    /// Drains the action queue and steps every registered task once.
    ///
    /// Must be called from the designated thread.
    pub fn tick(&self) {
        debug_assert!(
            self.on_dispatch_thread(),
            "Dispatcher::tick called off the designated thread"
        );

        while let Ok(action) = self.shared.rx.try_recv() {
            action();
        }

        // Take the task list out of the lock so a task registering another
        // task does not deadlock; new registrations land after the batch.
        let mut tasks = {
            let mut slot = self
                .shared
                .tasks
                .lock()
                .expect("dispatcher task list poisoned");
            std::mem::take(&mut *slot)
        };

        tasks.retain_mut(|task| task() == TaskStep::Again);

        let mut slot = self
            .shared
            .tasks
            .lock()
            .expect("dispatcher task list poisoned");
        tasks.extend(slot.drain(..));
        *slot = tasks;
    }

    /// Ticks until the queue is empty and no stepped tasks remain.
    ///
    /// Intended for tests and hosts that want to settle all in-flight work
    /// at a synchronization point.
    pub fn run_until_idle(&self) {
        loop {
            self.tick();
            if self.is_idle() {
                break;
            }
        }
    }

    /// Whether the queue is empty and no stepped tasks are registered.
    pub fn is_idle(&self) -> bool {
        self.shared.rx.is_empty()
            && self
                .shared
                .tasks
                .lock()
                .expect("dispatcher task list poisoned")
                .is_empty()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queued", &self.shared.rx.len())
            .finish()
    }
}
