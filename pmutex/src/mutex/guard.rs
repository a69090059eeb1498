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

use std::fmt;
use std::marker::PhantomData;

use crate::mutex::LockOutcome;
use crate::mutex::Mutex;
use crate::Result;

/// RAII structure used to release one level of ownership of a mutex when dropped.
///
/// This structure is created by the [`guard`] and [`try_guard`] methods on [`Mutex`]. It must be
/// dropped on the thread that created it.
///
/// [`guard`]: Mutex::guard
/// [`try_guard`]: Mutex::try_guard
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
    outcome: LockOutcome,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: a shared guard only exposes `&Mutex`, which is `Sync`, and a `Copy` `LockOutcome`.
unsafe impl Sync for MutexGuard<'_> {}

impl<'a> MutexGuard<'a> {
    pub(super) fn new(mutex: &'a Mutex, outcome: LockOutcome) -> Self {
        MutexGuard {
            mutex,
            outcome,
            _not_send: PhantomData,
        }
    }

    /// Returns how the lock was acquired.
    pub fn outcome(&self) -> LockOutcome {
        self.outcome
    }

    /// Marks the guarded robust mutex consistent; see [`Mutex::make_consistent`].
    pub fn make_consistent(&mut self) -> Result<()> {
        self.mutex.make_consistent()?;
        self.outcome = LockOutcome::Acquired;
        Ok(())
    }

    pub fn mutex(&self) -> &'a Mutex {
        self.mutex
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.mutex.unlock() {
            tracing::warn!(%err, "failed to unlock mutex on guard drop");
        }
    }
}

impl fmt::Debug for MutexGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexGuard")
            .field("mutex", self.mutex)
            .field("outcome", &self.outcome)
            .finish()
    }
}
