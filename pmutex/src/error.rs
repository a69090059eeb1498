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

use crate::posix;

/// Errors reported by mutex operations.
///
/// Every failure leaves the mutex exactly as it was before the call, except
/// [`Error::NotRecoverable`], which reports a terminal state of a robust mutex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An argument was malformed, or the operation does not apply to this mutex.
    #[error("invalid argument")]
    InvalidArgument,
    /// Process-shared mutexes were requested.
    #[error("process-shared mutexes are not supported")]
    NotSupported,
    /// The robust registry has no room for another node.
    #[error("out of memory: robust registry is full")]
    OutOfMemory,
    /// The wait primitive could not be created.
    #[error("wait primitive could not be created: {0}")]
    ResourceExhausted(String),
    /// The calling thread already owns this non-recursive mutex.
    #[error("deadlock detected: mutex already owned by the calling thread")]
    DeadlockDetected,
    /// The calling thread does not own the mutex.
    #[error("mutex is not owned by the calling thread")]
    NotOwner,
    /// The mutex is locked, or threads are waiting on it.
    #[error("mutex is busy")]
    Busy,
    /// `make_consistent` was called while the mutex was not inconsistent.
    #[error("mutex is not in an inconsistent state")]
    InvalidState,
    /// A robust mutex was released without being made consistent and can no longer be locked.
    #[error("mutex is not recoverable")]
    NotRecoverable,
    /// The deadline passed before the mutex could be acquired.
    #[error("timed out waiting for mutex")]
    TimedOut,
    /// The recursion depth of a recursive mutex would overflow.
    #[error("maximum recursion depth exceeded")]
    RecursionLimit,
}

impl Error {
    /// Returns the POSIX error number for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Error::InvalidArgument => posix::EINVAL,
            Error::NotSupported => posix::ENOSYS,
            Error::OutOfMemory => posix::ENOMEM,
            Error::ResourceExhausted(_) => posix::ENOSPC,
            Error::DeadlockDetected => posix::EDEADLK,
            Error::NotOwner => posix::EPERM,
            Error::Busy => posix::EBUSY,
            Error::InvalidState => posix::EINVAL,
            Error::NotRecoverable => posix::ENOTRECOVERABLE,
            Error::TimedOut => posix::ETIMEDOUT,
            Error::RecursionLimit => posix::EAGAIN,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
