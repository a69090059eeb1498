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
use std::sync::atomic::AtomicI32;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::event::WaitPrimitive;
use crate::kind::ConsistencyState;
use crate::kind::MutexKind;
use crate::kind::Robustness;
use crate::thread::ThreadToken;
use crate::Error;
use crate::LockOutcome;
use crate::Result;

const UNLOCKED: i32 = 0; // unlocked
const LOCKED: i32 = 1; // locked, no other threads waiting
const CONTENDED: i32 = -1; // locked, and other threads may be waiting

/// The state shared between a mutex and its registry node.
///
/// `lock_idx` is the only field contended between threads. `owner` and `depth` are written by the
/// thread holding the claim on `lock_idx` (or by abandonment, which takes the owner over with a
/// CAS), so relaxed accesses suffice for them.
pub(crate) struct Core {
    kind: MutexKind,
    robustness: Robustness,
    lock_idx: AtomicI32,
    owner: AtomicU64,
    depth: AtomicU32,
    waiters: AtomicUsize,
    state: AtomicU8,
    event: Box<dyn WaitPrimitive>,
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("kind", &self.kind)
            .field("robustness", &self.robustness)
            .field("lock_idx", &self.lock_idx.load(Ordering::Relaxed))
            .field("owner", &self.owner())
            .field("depth", &self.depth())
            .field("state", &self.consistency())
            .finish_non_exhaustive()
    }
}

impl Core {
    pub(crate) fn new(
        kind: MutexKind,
        robustness: Robustness,
        event: Box<dyn WaitPrimitive>,
    ) -> Self {
        Core {
            kind,
            robustness,
            lock_idx: AtomicI32::new(UNLOCKED),
            owner: AtomicU64::new(0),
            depth: AtomicU32::new(0),
            waiters: AtomicUsize::new(0),
            state: AtomicU8::new(ConsistencyState::Consistent.as_u8()),
            event,
        }
    }

    pub(crate) fn kind(&self) -> MutexKind {
        self.kind
    }

    pub(crate) fn robustness(&self) -> Robustness {
        self.robustness
    }

    pub(crate) fn consistency(&self) -> ConsistencyState {
        ConsistencyState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_consistency(&self, state: ConsistencyState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn owner(&self) -> Option<ThreadToken> {
        ThreadToken::from_u64(self.owner.load(Ordering::Acquire))
    }

    pub(crate) fn is_owned_by(&self, me: ThreadToken) -> bool {
        self.owner.load(Ordering::Acquire) == me.as_u64()
    }

    pub(crate) fn depth(&self) -> u32 {
        self.depth.load(Ordering::Relaxed)
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.lock_idx.load(Ordering::Acquire) != UNLOCKED
    }

    pub(crate) fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }

    fn check_recoverable(&self) -> Result<()> {
        if self.consistency() == ConsistencyState::NotRecoverable {
            Err(Error::NotRecoverable)
        } else {
            Ok(())
        }
    }

    /// Acquires the mutex for `me`, suspending on the wait primitive under contention.
    ///
    /// With a `deadline`, gives up with [`Error::TimedOut`] once it passes.
    pub(crate) fn lock(&self, me: ThreadToken, deadline: Option<Instant>) -> Result<LockOutcome> {
        self.check_recoverable()?;

        if self.is_owned_by(me) {
            return self.relock();
        }

        if self
            .lock_idx
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.lock_contended(deadline)?;
        }

        self.acquired(me)
    }

    /// Acquires the mutex for `me` only if that needs no waiting.
    ///
    /// Decides like [`lock`](Core::lock); only a mutex held by another thread is `Busy`.
    pub(crate) fn try_lock(&self, me: ThreadToken) -> Result<LockOutcome> {
        self.check_recoverable()?;

        if self.is_owned_by(me) {
            return self.relock();
        }

        if self
            .lock_idx
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(Error::Busy);
        }

        self.acquired(me)
    }

    fn relock(&self) -> Result<LockOutcome> {
        match self.kind {
            MutexKind::Recursive => {
                let depth = self.depth().checked_add(1).ok_or(Error::RecursionLimit)?;
                self.depth.store(depth, Ordering::Relaxed);
                Ok(LockOutcome::Acquired)
            }
            MutexKind::Normal | MutexKind::ErrorCheck => Err(Error::DeadlockDetected),
        }
    }

    #[cold]
    fn lock_contended(&self, deadline: Option<Instant>) -> Result<()> {
        let _waiting = WaiterGuard::new(&self.waiters);
        tracing::trace!(kind = ?self.kind, "mutex contended");

        loop {
            if self.consistency() == ConsistencyState::NotRecoverable {
                // Pass the wake-up on so every other waiter observes the terminal state too.
                self.event.signal();
                return Err(Error::NotRecoverable);
            }

            // Mark the lock contended; if it was free we just took it.
            if self.lock_idx.swap(CONTENDED, Ordering::Acquire) == UNLOCKED {
                return Ok(());
            }

            match deadline {
                None => self.event.wait(),
                Some(deadline) => {
                    if !self.event.wait_until(deadline) {
                        return Err(Error::TimedOut);
                    }
                }
            }
        }
    }

    /// Completes an acquisition once the lock word has been claimed.
    fn acquired(&self, me: ThreadToken) -> Result<LockOutcome> {
        match self.consistency() {
            ConsistencyState::NotRecoverable => {
                self.release();
                Err(Error::NotRecoverable)
            }
            state => {
                self.owner.store(me.as_u64(), Ordering::Release);
                self.depth.store(1, Ordering::Relaxed);
                if state == ConsistencyState::Inconsistent {
                    Ok(LockOutcome::OwnerDied)
                } else {
                    Ok(LockOutcome::Acquired)
                }
            }
        }
    }

    pub(crate) fn unlock(&self, me: ThreadToken) -> Result<()> {
        if !self.is_owned_by(me) {
            return Err(Error::NotOwner);
        }

        if self.kind == MutexKind::Recursive {
            let depth = self.depth();
            if depth > 1 {
                self.depth.store(depth - 1, Ordering::Relaxed);
                return Ok(());
            }
        }

        self.owner.store(0, Ordering::Release);
        self.depth.store(0, Ordering::Relaxed);

        if self.robustness.is_robust() && self.consistency() == ConsistencyState::Inconsistent {
            tracing::warn!(
                kind = ?self.kind,
                "robust mutex unlocked while inconsistent; it is now not recoverable"
            );
            self.set_consistency(ConsistencyState::NotRecoverable);
        }

        self.release();
        Ok(())
    }

    fn release(&self) {
        if self.lock_idx.swap(UNLOCKED, Ordering::Release) == CONTENDED {
            // Wake one waiter; it re-marks the lock contended when it takes it, so any others
            // are woken in turn.
            self.event.signal();
        }
    }

    pub(crate) fn make_consistent(&self, me: ThreadToken) -> Result<()> {
        if !self.robustness.is_robust() {
            return Err(Error::InvalidArgument);
        }
        // Nobody can hold a not recoverable mutex, so report the state rather than ownership.
        if self.consistency() == ConsistencyState::NotRecoverable {
            return Err(Error::InvalidState);
        }
        if !self.is_owned_by(me) {
            return Err(Error::NotOwner);
        }
        match self.consistency() {
            ConsistencyState::Inconsistent => {
                self.set_consistency(ConsistencyState::Consistent);
                tracing::debug!(kind = ?self.kind, "robust mutex made consistent");
                Ok(())
            }
            ConsistencyState::Consistent | ConsistencyState::NotRecoverable => {
                Err(Error::InvalidState)
            }
        }
    }

    /// Releases a robust mutex whose owner terminated without unlocking it.
    ///
    /// With `Some(owner)`, only acts if that thread is the current owner. Returns `true` if an
    /// abandoned lock was released. Stalled mutexes are never released.
    pub(crate) fn abandon(&self, owner: Option<ThreadToken>) -> bool {
        if !self.robustness.is_robust() {
            return false;
        }

        let current = self.owner.load(Ordering::Acquire);
        if current == 0 || owner.is_some_and(|owner| owner.as_u64() != current) {
            return false;
        }
        if self
            .owner
            .compare_exchange(current, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.depth.store(0, Ordering::Relaxed);
        self.set_consistency(ConsistencyState::Inconsistent);
        tracing::debug!(kind = ?self.kind, owner = current, "robust mutex abandoned by its owner");
        self.release();
        true
    }
}

/// Counts a thread as blocked for as long as it lives, so a waiter that times out or unwinds is
/// never left behind as a phantom claimant.
struct WaiterGuard<'a> {
    waiters: &'a AtomicUsize,
}

impl<'a> WaiterGuard<'a> {
    fn new(waiters: &'a AtomicUsize) -> Self {
        waiters.fetch_add(1, Ordering::AcqRel);
        WaiterGuard { waiters }
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.waiters.fetch_sub(1, Ordering::AcqRel);
    }
}
