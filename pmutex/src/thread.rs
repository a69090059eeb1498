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

//! Opaque thread identities and the thread-exit abandonment hook.

use std::cell::Cell;
use std::cell::RefCell;
use std::num::NonZeroU64;
use std::ptr;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::registry::RobustRegistry;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identifies a thread for ownership checks.
///
/// Tokens are compared for equality only; holding one grants no control over the thread. No two
/// threads alive in the same process share a token, and tokens are never reused. A thread keeps
/// its token until it has fully exited, including while its thread-local destructors run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadToken(NonZeroU64);

impl ThreadToken {
    /// Returns the token of the calling thread.
    pub fn current() -> ThreadToken {
        TOKEN.with(|token| match ThreadToken::from_u64(token.get()) {
            Some(current) => current,
            None => {
                let current = ThreadToken::fresh();
                token.set(current.as_u64());
                current
            }
        })
    }

    fn fresh() -> ThreadToken {
        let id = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        match NonZeroU64::new(id) {
            Some(id) => ThreadToken(id),
            None => unreachable!("thread token counter wrapped"),
        }
    }

    pub(crate) const fn as_u64(self) -> u64 {
        self.0.get()
    }

    pub(crate) fn from_u64(v: u64) -> Option<ThreadToken> {
        NonZeroU64::new(v).map(ThreadToken)
    }
}

/// Registries holding robust mutexes this thread has owned.
struct ExitHook {
    registries: RefCell<Vec<&'static RobustRegistry>>,
}

impl Drop for ExitHook {
    fn drop(&mut self) {
        let me = ThreadToken::current();
        for registry in self.registries.get_mut().drain(..) {
            let released = registry.owner_terminated(me);
            if released > 0 {
                tracing::debug!(
                    token = me.as_u64(),
                    released,
                    "thread exited holding robust mutexes"
                );
            }
        }
    }
}

thread_local! {
    // No destructor, so it stays readable while other thread-locals are destroyed.
    static TOKEN: Cell<u64> = const { Cell::new(0) };

    static EXIT_HOOK: ExitHook = const {
        ExitHook {
            registries: RefCell::new(Vec::new()),
        }
    };
}

/// Arranges for `registry` to be told when the calling thread exits.
///
/// Does nothing once the thread's exit hook has already run.
pub(crate) fn watch_exit(registry: &'static RobustRegistry) {
    let _ = EXIT_HOOK.try_with(|hook| {
        let mut registries = hook.registries.borrow_mut();
        if !registries.iter().any(|r| ptr::eq(*r, registry)) {
            registries.push(registry);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_stable_per_thread() {
        assert_eq!(ThreadToken::current(), ThreadToken::current());
    }

    #[test]
    fn test_tokens_differ_across_threads() {
        let here = ThreadToken::current();
        let there = std::thread::spawn(ThreadToken::current).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_token_survives_into_late_destructors() {
        use std::sync::mpsc;
        use std::sync::Arc;

        use crate::LockOutcome;
        use crate::Mutex;
        use crate::MutexAttr;
        use crate::Result;
        use crate::Robustness;

        type Seen = (ThreadToken, Result<LockOutcome>, Result<LockOutcome>, Result<()>);

        struct Late {
            mutex: Arc<Mutex>,
            tx: mpsc::Sender<Seen>,
        }

        impl Drop for Late {
            fn drop(&mut self) {
                let token = ThreadToken::current();
                let lock = self.mutex.lock();
                let relock = self.mutex.lock();
                let unlock = self.mutex.unlock();
                let _ = self.tx.send((token, lock, relock, unlock));
            }
        }

        thread_local! {
            static LATE: RefCell<Option<Late>> = const { RefCell::new(None) };
        }

        let mutex = Arc::new(Mutex::new(None).unwrap());
        let robust = MutexAttr::new().with_robustness(Robustness::Robust);
        let robust = Arc::new(Mutex::new(Some(&robust)).unwrap());
        let (tx, rx) = mpsc::channel();

        let m = mutex.clone();
        let r = robust.clone();
        let token = std::thread::spawn(move || {
            // Registered first, so destroyed after the exit hook below.
            LATE.with(|late| *late.borrow_mut() = Some(Late { mutex: m, tx }));
            r.lock().unwrap();
            r.unlock().unwrap();
            ThreadToken::current()
        })
        .join()
        .unwrap();

        let (late_token, lock, relock, unlock) = rx.recv().unwrap();
        assert_eq!(late_token, token);
        assert_eq!(lock, Ok(LockOutcome::Acquired));
        assert_eq!(relock, Err(crate::Error::DeadlockDetected));
        assert_eq!(unlock, Ok(()));
        assert!(!mutex.is_locked());
        assert!(!robust.is_locked());
    }

    #[test]
    fn test_raw_round_trip() {
        let token = ThreadToken::current();
        assert_eq!(ThreadToken::from_u64(token.as_u64()), Some(token));
        assert_eq!(ThreadToken::from_u64(0), None);
    }
}
