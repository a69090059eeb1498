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

//! Creation-time configuration of a mutex.

use crate::kind::MutexKind;
use crate::kind::Robustness;
use crate::Result;

/// Whether a mutex may be shared between processes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessSharing {
    #[default]
    Private,
    /// Not supported; creating a mutex with this setting fails with
    /// [`Error::NotSupported`](crate::Error::NotSupported).
    Shared,
}

/// Attributes read once when a [`Mutex`](crate::Mutex) is created.
///
/// # Examples
///
/// ```
/// use pmutex::{Mutex, MutexAttr, MutexKind};
///
/// let attr = MutexAttr::new().with_kind(MutexKind::ErrorCheck);
/// let mutex = Mutex::new(Some(&attr)).unwrap();
/// assert_eq!(mutex.kind(), MutexKind::ErrorCheck);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutexAttr {
    kind: MutexKind,
    robustness: Robustness,
    process_sharing: ProcessSharing,
}

impl MutexAttr {
    /// Returns attributes for a normal, stalled, process-private mutex.
    pub const fn new() -> Self {
        MutexAttr {
            kind: MutexKind::Normal,
            robustness: Robustness::Stalled,
            process_sharing: ProcessSharing::Private,
        }
    }

    pub const fn with_kind(mut self, kind: MutexKind) -> Self {
        self.kind = kind;
        self
    }

    pub const fn with_robustness(mut self, robustness: Robustness) -> Self {
        self.robustness = robustness;
        self
    }

    pub const fn with_process_sharing(mut self, process_sharing: ProcessSharing) -> Self {
        self.process_sharing = process_sharing;
        self
    }

    pub const fn kind(&self) -> MutexKind {
        self.kind
    }

    pub const fn robustness(&self) -> Robustness {
        self.robustness
    }

    pub const fn process_sharing(&self) -> ProcessSharing {
        self.process_sharing
    }

    /// Sets the kind from its raw value (`0` normal, `1` recursive, `2` error-checking).
    ///
    /// Unknown values fail with [`Error::InvalidArgument`](crate::Error::InvalidArgument) and
    /// leave the attributes unchanged.
    pub fn set_kind_raw(&mut self, raw: i32) -> Result<()> {
        self.kind = MutexKind::try_from(raw)?;
        Ok(())
    }

    /// Sets the robustness from its raw value (`0` stalled, `1` robust).
    pub fn set_robustness_raw(&mut self, raw: i32) -> Result<()> {
        self.robustness = Robustness::try_from(raw)?;
        Ok(())
    }

    /// Sets process sharing from a flag; `true` requests a process-shared mutex.
    pub fn set_process_shared(&mut self, shared: bool) {
        self.process_sharing = if shared {
            ProcessSharing::Shared
        } else {
            ProcessSharing::Private
        };
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_err;
    use tokio_test::assert_ok;

    use super::*;
    use crate::Error;

    #[test]
    fn test_defaults() {
        let attr = MutexAttr::default();
        assert_eq!(attr, MutexAttr::new());
        assert_eq!(attr.kind(), MutexKind::Normal);
        assert_eq!(attr.robustness(), Robustness::Stalled);
        assert_eq!(attr.process_sharing(), ProcessSharing::Private);
    }

    #[test]
    fn test_raw_setters() {
        let mut attr = MutexAttr::new();
        assert_ok!(attr.set_kind_raw(1));
        assert_ok!(attr.set_robustness_raw(1));
        assert_eq!(attr.kind(), MutexKind::Recursive);
        assert_eq!(attr.robustness(), Robustness::Robust);

        assert_eq!(attr.set_kind_raw(7), Err(Error::InvalidArgument));
        assert_err!(attr.set_robustness_raw(-1));
        assert_eq!(attr.kind(), MutexKind::Recursive);
        assert_eq!(attr.robustness(), Robustness::Robust);

        attr.set_process_shared(true);
        assert_eq!(attr.process_sharing(), ProcessSharing::Shared);
    }
}
