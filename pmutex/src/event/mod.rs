// Copyright 2024 tison <wander4096@gmail.com>
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

//! The blocking primitive a mutex falls back to under contention.
//!
//! A wait primitive behaves like an auto-reset event: it starts unsignaled, [`signal`] releases
//! at most one waiter (or the next thread to wait, if nobody is waiting yet), and the primitive
//! resets itself as that waiter passes. Signals do not accumulate.
//!
//! [`Event`] is the default implementation. Others can be supplied through
//! [`Mutex::with_wait_primitive`](crate::Mutex::with_wait_primitive).
//!
//! [`signal`]: WaitPrimitive::signal

use std::fmt;
use std::time::Instant;

use crate::internal::Condvar;
use crate::internal::Mutex;

#[cfg(test)]
mod tests;

/// An auto-reset, initially unsignaled binary wait handle.
pub trait WaitPrimitive: Send + Sync {
    /// Sets the signaled state, releasing at most one waiter.
    fn signal(&self);

    /// Blocks until signaled, then resets the signaled state.
    fn wait(&self);

    /// Blocks until signaled or until `deadline`.
    ///
    /// Returns `true` if the signal was consumed, `false` on timeout.
    fn wait_until(&self, deadline: Instant) -> bool;
}

/// An auto-reset event built on the crate's internal lock and condition variable.
pub struct Event {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    /// Creates an unsignaled event.
    pub const fn new() -> Self {
        Event {
            signaled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Returns `true` if a signal is pending.
    ///
    /// This method is typically used for debugging and testing purposes.
    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

impl WaitPrimitive for Event {
    fn signal(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_one();
    }

    fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            signaled = self.cond.wait(signaled);
        }
        *signaled = false;
    }

    fn wait_until(&self, deadline: Instant) -> bool {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            let (guard, timed_out) = self.cond.wait_until(signaled, deadline);
            signaled = guard;
            if timed_out && !*signaled {
                return false;
            }
        }
        *signaled = false;
        true
    }
}
