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

use std::sync::Arc;

use divan::Bencher;
use pmutex::Mutex;
use pmutex::MutexAttr;
use pmutex::MutexKind;
use pmutex::Robustness;

const KINDS: [(MutexKind, Robustness); 4] = [
    (MutexKind::Normal, Robustness::Stalled),
    (MutexKind::Recursive, Robustness::Stalled),
    (MutexKind::ErrorCheck, Robustness::Stalled),
    (MutexKind::Normal, Robustness::Robust),
];

fn new_mutex(kind: MutexKind, robustness: Robustness) -> Mutex {
    let attr = MutexAttr::new()
        .with_kind(kind)
        .with_robustness(robustness);
    Mutex::new(Some(&attr)).unwrap()
}

#[divan::bench(args = KINDS)]
fn benchmark_uncontended(bencher: Bencher, (kind, robustness): (MutexKind, Robustness)) {
    let mutex = new_mutex(kind, robustness);
    bencher.bench_local(|| {
        mutex.lock().unwrap();
        mutex.unlock().unwrap();
    });
}

#[divan::bench(threads = [2, 4, 8])]
fn benchmark_contention(bencher: Bencher) {
    let mutex = Arc::new(new_mutex(MutexKind::Normal, Robustness::Stalled));
    bencher.bench(|| {
        mutex.lock().unwrap();
        mutex.unlock().unwrap();
    });
}

#[divan::bench]
fn benchmark_create_destroy(bencher: Bencher) {
    bencher.bench_local(|| {
        let mutex = new_mutex(MutexKind::Normal, Robustness::Robust);
        mutex.destroy().unwrap();
    });
}

fn main() {
    divan::main()
}
