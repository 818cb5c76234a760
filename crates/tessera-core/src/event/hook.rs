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

/// An ordered list of callbacks invoked with a shared reference to an event
/// value.
///
/// Callbacks run on whatever thread calls [`Hook::emit`]; the registry only
/// ever emits from the dispatcher thread, which gives host observers the
/// single-threaded, registration-ordered delivery they rely on.
pub struct Hook<T: ?Sized> {
    callbacks: Vec<Box<dyn FnMut(&T) + Send>>,
}

impl<T: ?Sized> Hook<T> {
    /// Creates an empty hook.
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Registers a callback. Callbacks fire in registration order.
    pub fn connect(&mut self, callback: impl FnMut(&T) + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Invokes every registered callback with `value`.
    pub fn emit(&mut self, value: &T) {
        for callback in &mut self.callbacks {
            callback(value);
        }
    }

    /// Moves every callback of `other` to the end of this hook's list.
    /// Used by emitters that swap the hook out while firing, so callbacks
    /// registered mid-emit are not lost.
    pub fn append(&mut self, mut other: Hook<T>) {
        self.callbacks.append(&mut other.callbacks);
    }

    /// The number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl<T: ?Sized> Default for Hook<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
