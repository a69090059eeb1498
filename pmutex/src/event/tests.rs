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

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use super::*;

#[test]
fn test_starts_unsignaled() {
    let event = Event::new();
    assert!(!event.is_signaled());
    assert!(!event.wait_until(Instant::now() + Duration::from_millis(10)));
}

#[test]
fn test_signal_before_wait_is_kept() {
    let event = Event::new();
    event.signal();
    assert!(event.is_signaled());
    event.wait();
    assert!(!event.is_signaled());
}

#[test]
fn test_signals_do_not_accumulate() {
    let event = Event::new();
    event.signal();
    event.signal();
    assert!(event.wait_until(Instant::now() + Duration::from_millis(10)));
    assert!(!event.wait_until(Instant::now() + Duration::from_millis(10)));
}

#[test]
fn test_one_signal_releases_one_waiter() {
    let event = Arc::new(Event::new());
    let released = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let event = event.clone();
            let released = released.clone();
            std::thread::spawn(move || {
                if event.wait_until(Instant::now() + Duration::from_millis(500)) {
                    released.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    std::thread::sleep(Duration::from_millis(50));
    event.signal();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(released.load(Ordering::SeqCst), 1);
}
