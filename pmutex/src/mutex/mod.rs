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

//! A POSIX-style mutex with normal, recursive, error-checking and robust variants.
//!
//! The mutex does not protect data by itself: like `pthread_mutex_t`, it is locked and unlocked
//! explicitly, and ownership belongs to the calling thread. An uncontended lock is a single
//! compare-and-swap on the lock word; under contention the caller suspends on the mutex's
//! [`WaitPrimitive`] until an unlock wakes it, then competes for the lock again. Wake-up order is
//! unspecified.
//!
//! A robust mutex whose owner terminates while holding it is released for the next owner, who
//! sees [`LockOutcome::OwnerDied`]. That owner either calls [`Mutex::make_consistent`] before
//! unlocking, or the mutex becomes permanently [`NotRecoverable`](Error::NotRecoverable).
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use pmutex::{Mutex, MutexAttr, MutexKind};
//!
//! let attr = MutexAttr::new().with_kind(MutexKind::Recursive);
//! let mutex = Arc::new(Mutex::new(Some(&attr)).unwrap());
//!
//! let handles: Vec<_> = (0..3)
//!     .map(|_| {
//!         let mutex = mutex.clone();
//!         std::thread::spawn(move || {
//!             mutex.lock().unwrap();
//!             mutex.lock().unwrap();
//!             mutex.unlock().unwrap();
//!             mutex.unlock().unwrap();
//!         })
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! assert!(!mutex.is_locked());
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

pub(crate) use self::state::Core;
use crate::attr::MutexAttr;
use crate::attr::ProcessSharing;
use crate::event::Event;
use crate::event::WaitPrimitive;
use crate::kind::ConsistencyState;
use crate::kind::MutexKind;
use crate::kind::Robustness;
use crate::registry::RobustNode;
use crate::registry::RobustRegistry;
use crate::thread;
use crate::thread::ThreadToken;
use crate::Error;
use crate::Result;

mod guard;
mod state;
pub use guard::MutexGuard;


/// How a successful lock acquired the mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockOutcome {
    Acquired,
    /// The previous owner of this robust mutex terminated while holding it. The caller owns the
    /// mutex, but the protected state may be broken; call [`Mutex::make_consistent`] once it is
    /// repaired, or the mutex becomes not recoverable on unlock.
    OwnerDied,
}

/// A POSIX-style mutex.
///
/// See the [module level documentation](self) for more.
pub struct Mutex {
    core: Arc<Core>,
    node: Option<RobustNode>,
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("kind", &self.kind())
            .field("robustness", &self.robustness())
            .field("locked", &self.is_locked())
            .field("consistency", &self.consistency())
            .finish_non_exhaustive()
    }
}

impl Mutex {
    /// Creates an unlocked mutex from `attr`, or from default attributes if `None`.
    ///
    /// # Errors
    ///
    /// * [`Error::NotSupported`] if `attr` requests a process-shared mutex.
    /// * [`Error::OutOfMemory`] if a robust mutex cannot get a registry node.
    ///
    /// # Examples
    ///
    /// ```
    /// use pmutex::{Error, Mutex, MutexAttr, ProcessSharing};
    ///
    /// let mutex = Mutex::new(None).unwrap();
    /// assert!(!mutex.is_locked());
    ///
    /// let shared = MutexAttr::new().with_process_sharing(ProcessSharing::Shared);
    /// assert_eq!(Mutex::new(Some(&shared)).unwrap_err(), Error::NotSupported);
    /// ```
    pub fn new(attr: Option<&MutexAttr>) -> Result<Mutex> {
        Mutex::builder(attr).build()
    }

    /// Creates an unlocked mutex that suspends contended callers on the primitive `make`
    /// returns.
    ///
    /// If `make` fails, the error is reported as [`Error::ResourceExhausted`] and nothing
    /// created so far is kept.
    pub fn with_wait_primitive<W, F>(attr: Option<&MutexAttr>, make: F) -> Result<Mutex>
    where
        W: WaitPrimitive + 'static,
        F: FnOnce() -> io::Result<W>,
    {
        Mutex::builder(attr).build_with(make)
    }

    /// Returns a builder for a mutex with the given attributes.
    pub fn builder(attr: Option<&MutexAttr>) -> MutexBuilder {
        MutexBuilder {
            attr: attr.copied().unwrap_or_default(),
            registry: None,
        }
    }

    pub fn kind(&self) -> MutexKind {
        self.core.kind()
    }

    pub fn robustness(&self) -> Robustness {
        self.core.robustness()
    }

    /// Returns the consistency state; always [`ConsistencyState::Consistent`] for a stalled
    /// mutex.
    pub fn consistency(&self) -> ConsistencyState {
        self.core.consistency()
    }

    /// Returns `true` if some thread holds the mutex.
    ///
    /// This method is typically used for debugging and testing purposes.
    pub fn is_locked(&self) -> bool {
        self.core.is_locked()
    }

    pub fn is_owned_by_current_thread(&self) -> bool {
        self.core.is_owned_by(ThreadToken::current())
    }

    /// Returns the owning thread, if any.
    pub fn owner(&self) -> Option<ThreadToken> {
        self.core.owner()
    }

    /// Returns how many times the owner has locked the mutex; `0` when unlocked.
    pub fn recursion_depth(&self) -> u32 {
        self.core.depth()
    }

    /// Returns the number of threads blocked in [`lock`](Mutex::lock) and its timed variants.
    pub fn waiters(&self) -> usize {
        self.core.waiters()
    }

    /// Acquires the mutex, blocking the current thread until it is able to do so.
    ///
    /// # Errors
    ///
    /// * [`Error::DeadlockDetected`] if the calling thread already holds a normal or
    ///   error-checking mutex.
    /// * [`Error::RecursionLimit`] if a recursive mutex's depth would overflow.
    /// * [`Error::NotRecoverable`] if the robust mutex is not recoverable, including when that
    ///   happens while the caller is waiting.
    pub fn lock(&self) -> Result<LockOutcome> {
        let me = ThreadToken::current();
        let outcome = self.core.lock(me, None)?;
        self.watch_owner_exit();
        Ok(outcome)
    }

    /// Acquires the mutex only if it is free, or is a recursive mutex held by the calling
    /// thread. Never blocks.
    ///
    /// # Errors
    ///
    /// * [`Error::Busy`] if another thread holds the mutex.
    /// * [`Error::DeadlockDetected`], [`Error::NotRecoverable`] and [`Error::RecursionLimit`] as
    ///   for [`lock`](Mutex::lock).
    ///
    /// # Examples
    ///
    /// ```
    /// use pmutex::{Error, LockOutcome, Mutex};
    ///
    /// let mutex = Mutex::new(None).unwrap();
    /// assert_eq!(mutex.try_lock(), Ok(LockOutcome::Acquired));
    /// assert_eq!(mutex.try_lock(), Err(Error::DeadlockDetected));
    /// std::thread::scope(|s| {
    ///     assert_eq!(s.spawn(|| mutex.try_lock()).join().unwrap(), Err(Error::Busy));
    /// });
    /// mutex.unlock().unwrap();
    /// ```
    pub fn try_lock(&self) -> Result<LockOutcome> {
        let me = ThreadToken::current();
        let outcome = self.core.try_lock(me)?;
        self.watch_owner_exit();
        Ok(outcome)
    }

    /// Acquires the mutex, blocking no later than `deadline`.
    ///
    /// Fails with [`Error::TimedOut`] if the mutex could not be acquired in time; otherwise
    /// behaves like [`lock`](Mutex::lock).
    pub fn lock_until(&self, deadline: Instant) -> Result<LockOutcome> {
        let me = ThreadToken::current();
        let outcome = self.core.lock(me, Some(deadline))?;
        self.watch_owner_exit();
        Ok(outcome)
    }

    /// Acquires the mutex, blocking for at most `timeout`.
    pub fn lock_timeout(&self, timeout: Duration) -> Result<LockOutcome> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.lock_until(deadline),
            None => self.lock(),
        }
    }

    /// Releases one level of ownership held by the calling thread.
    ///
    /// A recursive mutex is released for other threads only when every lock has been paired
    /// with an unlock. Unlocking a robust mutex that is still inconsistent makes it not
    /// recoverable.
    ///
    /// # Errors
    ///
    /// [`Error::NotOwner`] if the calling thread does not hold the mutex; nothing changes.
    pub fn unlock(&self) -> Result<()> {
        self.core.unlock(ThreadToken::current())
    }

    /// Marks an inconsistent robust mutex held by the calling thread as consistent again.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if the mutex is not robust.
    /// * [`Error::NotOwner`] if the calling thread does not hold the mutex.
    /// * [`Error::InvalidState`] if the mutex is consistent or not recoverable.
    pub fn make_consistent(&self) -> Result<()> {
        self.core.make_consistent(ThreadToken::current())
    }

    /// Reports that the owner of this mutex terminated without unlocking it.
    ///
    /// A held robust mutex becomes inconsistent, loses its owner and wakes one waiter, exactly
    /// as if it had been unlocked. Returns `true` in that case. A stalled mutex stays locked, and
    /// an unlocked mutex is left alone; both return `false`.
    pub fn notify_owner_terminated(&self) -> bool {
        self.core.abandon(None)
    }

    /// Acquires the mutex and returns a guard that unlocks it when dropped.
    pub fn guard(&self) -> Result<MutexGuard<'_>> {
        let outcome = self.lock()?;
        Ok(MutexGuard::new(self, outcome))
    }

    /// Like [`guard`](Mutex::guard), but fails instead of blocking, as
    /// [`try_lock`](Mutex::try_lock) does.
    pub fn try_guard(&self) -> Result<MutexGuard<'_>> {
        let outcome = self.try_lock()?;
        Ok(MutexGuard::new(self, outcome))
    }

    /// Destroys the mutex, releasing its wait primitive and registry node.
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] if the mutex is locked or threads are waiting on it. The mutex is handed
    /// back intact through [`DestroyError::into_inner`].
    pub fn destroy(self) -> std::result::Result<(), DestroyError> {
        if self.core.is_locked() || self.core.waiters() > 0 {
            return Err(DestroyError {
                mutex: self,
                error: Error::Busy,
            });
        }
        tracing::debug!(kind = ?self.kind(), robustness = ?self.robustness(), "mutex destroyed");
        Ok(())
    }

    fn watch_owner_exit(&self) {
        if let Some(node) = &self.node {
            thread::watch_exit(node.registry());
        }
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        if self.core.is_locked() {
            tracing::warn!(kind = ?self.kind(), owner = ?self.owner(), "mutex dropped while locked");
        }
    }
}

/// The error returned by [`Mutex::destroy`], carrying the mutex that was not destroyed.
pub struct DestroyError {
    mutex: Mutex,
    error: Error,
}

impl DestroyError {
    pub fn error(&self) -> Error {
        self.error.clone()
    }

    /// Returns the mutex, which remains fully usable.
    pub fn into_inner(self) -> Mutex {
        self.mutex
    }
}

impl fmt::Debug for DestroyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestroyError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for DestroyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot destroy mutex: {}", self.error)
    }
}

impl std::error::Error for DestroyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Builds a [`Mutex`], acquiring each resource in turn and releasing all of them if a later
/// step fails.
#[derive(Debug)]
pub struct MutexBuilder {
    attr: MutexAttr,
    registry: Option<&'static RobustRegistry>,
}

impl MutexBuilder {
    /// Links a robust mutex into `registry` instead of [`RobustRegistry::global`].
    pub fn registry(mut self, registry: &'static RobustRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds the mutex with an [`Event`] as its wait primitive.
    pub fn build(self) -> Result<Mutex> {
        self.build_with(|| Ok(Event::new()))
    }

    /// Builds the mutex with the wait primitive `make` returns.
    pub fn build_with<W, F>(self, make: F) -> Result<Mutex>
    where
        W: WaitPrimitive + 'static,
        F: FnOnce() -> io::Result<W>,
    {
        let MutexBuilder { attr, registry } = self;

        if attr.process_sharing() == ProcessSharing::Shared {
            return Err(Error::NotSupported);
        }

        let node = if attr.robustness().is_robust() {
            let registry = registry.unwrap_or_else(RobustRegistry::global);
            Some(registry.reserve()?)
        } else {
            None
        };

        // `node`, if reserved, unlinks itself when this returns early.
        let event = make().map_err(|err| {
            tracing::debug!(%err, "failed to create wait primitive");
            Error::ResourceExhausted(err.to_string())
        })?;

        let core = Arc::new(Core::new(attr.kind(), attr.robustness(), Box::new(event)));
        if let Some(node) = &node {
            node.bind(Arc::downgrade(&core));
        }

        tracing::debug!(kind = ?attr.kind(), robustness = ?attr.robustness(), "mutex created");
        Ok(Mutex { core, node })
    }
}
