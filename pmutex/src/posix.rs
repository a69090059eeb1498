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

//! A `pthread_mutex_*`-shaped surface returning POSIX error numbers.
//!
//! Each function returns `0` on success and an error number otherwise. Lock functions return
//! [`EOWNERDEAD`] when they acquire a robust mutex whose previous owner died; the caller owns the
//! mutex in that case.
//!
//! # Examples
//!
//! ```
//! use pmutex::posix;
//!
//! let mut slot = None;
//! assert_eq!(posix::mutex_init(Some(&mut slot), None), 0);
//! let mutex = slot.as_ref().unwrap();
//! assert_eq!(posix::mutex_lock(mutex), 0);
//! assert_eq!(posix::mutex_trylock(mutex), posix::EDEADLK);
//! assert_eq!(posix::mutex_unlock(mutex), 0);
//! assert_eq!(posix::mutex_destroy(&mut slot), 0);
//! assert!(slot.is_none());
//! ```

use std::time::Instant;

use crate::attr::MutexAttr;
use crate::kind;
use crate::LockOutcome;
use crate::Mutex;
use crate::Result;

pub const EPERM: i32 = 1;
pub const EAGAIN: i32 = 11;
pub const ENOMEM: i32 = 12;
pub const EBUSY: i32 = 16;
pub const EINVAL: i32 = 22;
pub const ENOSPC: i32 = 28;
pub const EDEADLK: i32 = 35;
pub const ENOSYS: i32 = 38;
pub const ETIMEDOUT: i32 = 110;
pub const EOWNERDEAD: i32 = 130;
pub const ENOTRECOVERABLE: i32 = 131;

fn errno(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => err.errno(),
    }
}

fn lock_errno(result: Result<LockOutcome>) -> i32 {
    match result {
        Ok(LockOutcome::Acquired) => 0,
        Ok(LockOutcome::OwnerDied) => EOWNERDEAD,
        Err(err) => err.errno(),
    }
}

/// Creates a mutex in `dest`.
///
/// Returns [`EINVAL`] if there is no destination, and leaves `dest` untouched on any failure.
pub fn mutex_init(dest: Option<&mut Option<Mutex>>, attr: Option<&MutexAttr>) -> i32 {
    let Some(dest) = dest else {
        return EINVAL;
    };
    match Mutex::new(attr) {
        Ok(mutex) => {
            *dest = Some(mutex);
            0
        }
        Err(err) => err.errno(),
    }
}

pub fn mutex_lock(mutex: &Mutex) -> i32 {
    lock_errno(mutex.lock())
}

pub fn mutex_trylock(mutex: &Mutex) -> i32 {
    lock_errno(mutex.try_lock())
}

pub fn mutex_timedlock(mutex: &Mutex, deadline: Instant) -> i32 {
    lock_errno(mutex.lock_until(deadline))
}

pub fn mutex_unlock(mutex: &Mutex) -> i32 {
    errno(mutex.unlock())
}

pub fn mutex_consistent(mutex: &Mutex) -> i32 {
    errno(mutex.make_consistent())
}

/// Destroys the mutex in `slot`, emptying it.
///
/// Returns [`EINVAL`] for an empty slot. On [`EBUSY`] the mutex is put back into `slot`.
pub fn mutex_destroy(slot: &mut Option<Mutex>) -> i32 {
    let Some(mutex) = slot.take() else {
        return EINVAL;
    };
    match mutex.destroy() {
        Ok(()) => 0,
        Err(err) => {
            let code = err.error().errno();
            *slot = Some(err.into_inner());
            code
        }
    }
}

/// Returns the packed kind of `mutex`: its kind for a stalled mutex, `-kind - 1` for a robust one.
pub fn mutex_kind(mutex: &Mutex) -> i32 {
    kind::encode(mutex.kind(), mutex.robustness())
}

pub fn mutexattr_settype(attr: &mut MutexAttr, kind: i32) -> i32 {
    errno(attr.set_kind_raw(kind))
}

pub fn mutexattr_setrobust(attr: &mut MutexAttr, robustness: i32) -> i32 {
    errno(attr.set_robustness_raw(robustness))
}

pub fn mutexattr_setpshared(attr: &mut MutexAttr, shared: bool) -> i32 {
    attr.set_process_shared(shared);
    0
}
