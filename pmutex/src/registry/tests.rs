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

use std::io;

use tokio_test::assert_err;
use tokio_test::assert_ok;

use super::*;
use crate::event::Event;
use crate::kind::ConsistencyState;
use crate::kind::Robustness;
use crate::LockOutcome;
use crate::MutexAttr;

fn leaked(capacity: usize) -> &'static RobustRegistry {
    Box::leak(Box::new(RobustRegistry::new(RegistryConfig::with_capacity(
        capacity,
    ))))
}

fn robust() -> MutexAttr {
    MutexAttr::new().with_robustness(Robustness::Robust)
}

#[test]
fn test_robust_mutex_links_and_unlinks() {
    let registry = leaked(8);
    let attr = robust();

    let a = assert_ok!(crate::Mutex::builder(Some(&attr)).registry(registry).build());
    let b = assert_ok!(crate::Mutex::builder(Some(&attr)).registry(registry).build());
    assert_eq!(registry.len(), 2);

    drop(a);
    assert_eq!(registry.len(), 1);
    assert_ok!(b.destroy());
    assert!(registry.is_empty());
}

#[test]
fn test_stalled_mutex_is_not_linked() {
    let registry = leaked(8);
    let mutex = assert_ok!(crate::Mutex::builder(None).registry(registry).build());
    assert!(registry.is_empty());
    drop(mutex);
}

#[test]
fn test_full_registry_is_out_of_memory() {
    let registry = leaked(1);
    let attr = robust();

    let first = assert_ok!(crate::Mutex::builder(Some(&attr)).registry(registry).build());
    let err = assert_err!(crate::Mutex::builder(Some(&attr)).registry(registry).build());
    assert_eq!(err, Error::OutOfMemory);
    assert_eq!(registry.len(), 1);

    drop(first);
    assert_ok!(crate::Mutex::builder(Some(&attr)).registry(registry).build());
}

#[test]
fn test_failed_wait_primitive_rolls_back_node() {
    let registry = leaked(4);
    let attr = robust();

    let err = assert_err!(crate::Mutex::builder(Some(&attr))
        .registry(registry)
        .build_with(|| -> io::Result<Event> { Err(io::Error::other("no handles left")) }));
    assert_eq!(err, Error::ResourceExhausted("no handles left".to_string()));
    assert!(registry.is_empty());
}

#[test]
fn test_owner_terminated_releases_only_that_owner() {
    let registry = leaked(8);
    let attr = robust();
    let held = assert_ok!(crate::Mutex::builder(Some(&attr)).registry(registry).build());
    let other = assert_ok!(crate::Mutex::builder(Some(&attr)).registry(registry).build());

    assert_eq!(assert_ok!(held.lock()), LockOutcome::Acquired);
    let me = ThreadToken::current();

    let stranger = std::thread::spawn(ThreadToken::current).join().unwrap();
    assert_eq!(registry.owner_terminated(stranger), 0);
    assert!(held.is_locked());

    assert_eq!(registry.owner_terminated(me), 1);
    assert!(!held.is_locked());
    assert_eq!(held.owner(), None);
    assert_eq!(held.consistency(), ConsistencyState::Inconsistent);
    assert_eq!(other.consistency(), ConsistencyState::Consistent);

    assert_eq!(assert_ok!(held.lock()), LockOutcome::OwnerDied);
    assert_ok!(held.make_consistent());
    assert_ok!(held.unlock());
}

#[test]
fn test_thread_exit_releases_robust_mutex() {
    let registry = leaked(8);
    let attr = robust();
    let mutex = assert_ok!(crate::Mutex::builder(Some(&attr)).registry(registry).build());

    // An explicit join waits for the thread's exit hooks, not just its closure.
    std::thread::scope(|s| {
        s.spawn(|| {
            assert_eq!(assert_ok!(mutex.lock()), LockOutcome::Acquired);
        })
        .join()
        .unwrap();
    });

    assert!(!mutex.is_locked());
    assert_eq!(mutex.consistency(), ConsistencyState::Inconsistent);
    assert_eq!(assert_ok!(mutex.try_lock()), LockOutcome::OwnerDied);
    assert_ok!(mutex.make_consistent());
    assert_ok!(mutex.unlock());
    assert_eq!(mutex.consistency(), ConsistencyState::Consistent);
}

#[test]
fn test_drain_unlinks_everything() {
    let registry = leaked(8);
    let attr = robust();
    let a = assert_ok!(crate::Mutex::builder(Some(&attr)).registry(registry).build());
    let b = assert_ok!(crate::Mutex::builder(Some(&attr)).registry(registry).build());

    assert_eq!(registry.drain(), 2);
    assert!(registry.is_empty());

    // A node created after the drain must survive the drained mutexes being dropped.
    let c = assert_ok!(crate::Mutex::builder(Some(&attr)).registry(registry).build());
    drop(a);
    drop(b);
    assert_eq!(registry.len(), 1);
    drop(c);
    assert!(registry.is_empty());
}

#[test]
fn test_init_after_first_use_fails() {
    let _ = RobustRegistry::global();
    assert_eq!(
        init(RegistryConfig::default()).unwrap_err(),
        Error::InvalidState
    );
}
