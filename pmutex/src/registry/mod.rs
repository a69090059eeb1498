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

//! The process-wide collection of live robust mutexes.
//!
//! Every robust [`Mutex`](crate::Mutex) links one node into a registry when it is created and
//! unlinks it when it is destroyed or dropped. When a thread terminates, the registry finds the
//! robust mutexes that thread still owns, marks them inconsistent and releases them, so that the
//! next owner observes [`LockOutcome::OwnerDied`](crate::LockOutcome::OwnerDied).
//!
//! The global registry is created on first use with [`RegistryConfig::default`], or explicitly
//! and exactly once with [`init`]. Threads that owned a robust mutex report their exit to it
//! automatically.
//!
//! # Examples
//!
//! ```
//! use pmutex::registry::RobustRegistry;
//! use pmutex::{Mutex, MutexAttr, Robustness};
//!
//! let attr = MutexAttr::new().with_robustness(Robustness::Robust);
//! let mutex = Mutex::new(Some(&attr)).unwrap();
//! assert!(RobustRegistry::global().len() >= 1);
//! drop(mutex);
//! ```

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::OnceLock;
use std::sync::Weak;

use crate::internal::Mutex;
use crate::internal::RobustList;
use crate::mutex::Core;
use crate::thread::ThreadToken;
use crate::Error;
use crate::Result;

#[cfg(test)]
mod tests;

static GLOBAL: OnceLock<RobustRegistry> = OnceLock::new();

/// Initializes the global registry with `config`.
///
/// Fails with [`Error::InvalidState`] if the global registry already exists, either from an
/// earlier call or because a robust mutex was created first.
pub fn init(config: RegistryConfig) -> Result<&'static RobustRegistry> {
    let mut fresh = false;
    let registry = GLOBAL.get_or_init(|| {
        fresh = true;
        RobustRegistry::new(config)
    });
    if fresh {
        tracing::debug!(capacity = config.capacity, "robust registry initialized");
        Ok(registry)
    } else {
        Err(Error::InvalidState)
    }
}

/// Configuration of a [`RobustRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of live robust mutexes. Creating one more fails with
    /// [`Error::OutOfMemory`].
    pub capacity: usize,
}

impl RegistryConfig {
    pub const DEFAULT_CAPACITY: usize = 4096;

    pub const fn with_capacity(capacity: usize) -> Self {
        RegistryConfig { capacity }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

#[derive(Debug)]
struct Entry {
    id: u64,
    core: Weak<Core>,
}

/// A registry of robust mutexes, guarded by its own lock.
pub struct RobustRegistry {
    config: RegistryConfig,
    next_id: AtomicU64,
    nodes: Mutex<RobustList<Entry>>,
}

impl fmt::Debug for RobustRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RobustRegistry")
            .field("capacity", &self.config.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl RobustRegistry {
    /// Creates an empty registry.
    ///
    /// Most programs only need [`RobustRegistry::global`]. A separate registry can be handed to
    /// [`MutexBuilder::registry`](crate::mutex::MutexBuilder::registry); it must live for the
    /// rest of the program, since threads report their exit to it.
    pub fn new(config: RegistryConfig) -> Self {
        RobustRegistry {
            config,
            next_id: AtomicU64::new(0),
            nodes: Mutex::new(RobustList::new()),
        }
    }

    /// Returns the global registry, creating it with the default configuration if needed.
    pub fn global() -> &'static RobustRegistry {
        GLOBAL.get_or_init(|| RobustRegistry::new(RegistryConfig::default()))
    }

    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Returns the number of linked robust mutexes.
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }

    /// Reserves a node with no mutex attached yet.
    ///
    /// The returned node unlinks itself when dropped, so a construction that fails after this
    /// point leaves nothing behind.
    pub(crate) fn reserve(&'static self) -> Result<RobustNode> {
        let mut nodes = self.nodes.lock();
        if nodes.len() >= self.config.capacity {
            return Err(Error::OutOfMemory);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let key = nodes.push_back(Entry {
            id,
            core: Weak::new(),
        });
        Ok(RobustNode {
            registry: self,
            key,
            id,
        })
    }

    /// Releases every robust mutex still owned by `owner`.
    ///
    /// Each such mutex becomes inconsistent, loses its owner, and wakes one waiter. Returns the
    /// number of mutexes released.
    pub fn owner_terminated(&self, owner: ThreadToken) -> usize {
        let nodes = self.nodes.lock();
        let mut released = 0;
        nodes.for_each(|entry| {
            if let Some(core) = entry.core.upgrade() {
                if core.abandon(Some(owner)) {
                    released += 1;
                }
            }
        });
        released
    }

    /// Unlinks every node, typically at shutdown.
    ///
    /// Mutexes whose nodes were drained stay usable, but their owner's termination is no longer
    /// detected. Returns the number of nodes unlinked.
    pub fn drain(&self) -> usize {
        let drained = self.nodes.lock().clear();
        if drained > 0 {
            tracing::debug!(drained, "robust registry drained");
        }
        drained
    }
}

/// A registry node owned by one robust mutex.
#[derive(Debug)]
pub(crate) struct RobustNode {
    registry: &'static RobustRegistry,
    key: usize,
    id: u64,
}

impl RobustNode {
    pub(crate) fn registry(&self) -> &'static RobustRegistry {
        self.registry
    }

    /// Attaches the mutex this node belongs to.
    pub(crate) fn bind(&self, core: Weak<Core>) {
        let mut nodes = self.registry.nodes.lock();
        if let Some(entry) = nodes.get_mut(self.key) {
            if entry.id == self.id {
                entry.core = core;
            }
        }
    }
}

impl Drop for RobustNode {
    fn drop(&mut self) {
        let id = self.id;
        self.registry
            .nodes
            .lock()
            .remove_if(self.key, |entry| entry.id == id);
    }
}
