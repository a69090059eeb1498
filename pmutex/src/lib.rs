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

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! POSIX-style mutexes built on a single auto-reset wait primitive.
//!
//! * [`MutexKind::Normal`] and [`MutexKind::ErrorCheck`] report a relock by the owner as
//!   [`Error::DeadlockDetected`] instead of deadlocking.
//! * [`MutexKind::Recursive`] counts relocks by the owner.
//! * [`Robustness::Robust`] mutexes survive an owner that terminates while holding them; see
//!   [`registry`].
//!
//! Process-shared mutexes are not supported.

mod internal;

pub mod attr;
pub mod error;
pub mod event;
pub mod kind;
pub mod mutex;
pub mod posix;
pub mod registry;
pub mod thread;

pub use attr::MutexAttr;
pub use attr::ProcessSharing;
pub use error::Error;
pub use error::Result;
pub use kind::ConsistencyState;
pub use kind::MutexKind;
pub use kind::Robustness;
pub use mutex::LockOutcome;
pub use mutex::Mutex;
pub use mutex::MutexGuard;

#[cfg(test)]
fn test_runtime() -> &'static tokio::runtime::Runtime {
    use std::sync::OnceLock;

    use tokio::runtime::Runtime;
    static RT: OnceLock<Runtime> = OnceLock::new();
    RT.get_or_init(|| Runtime::new().unwrap())
}

#[cfg(test)]
mod tests {
    use crate::event::Event;
    use crate::mutex::DestroyError;
    use crate::registry::RobustRegistry;
    use crate::Mutex;
    use crate::MutexGuard;

    #[test]
    fn send_and_sync() {
        fn assert_send_and_sync<T: Send + Sync>() {}
        assert_send_and_sync::<Mutex>();
        assert_send_and_sync::<Event>();
        assert_send_and_sync::<RobustRegistry>();
        assert_send_and_sync::<DestroyError>();
    }

    #[test]
    fn guard_is_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<MutexGuard<'_>>();
    }
}
