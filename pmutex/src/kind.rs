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

//! Mutex kinds, robustness, and their packed integer form.
//!
//! A [`Mutex`](crate::Mutex) stores its kind and robustness as two separate fields. The packed
//! form exists for the raw integer surface: a stalled mutex encodes as its kind (`>= 0`), and a
//! robust mutex as `-kind - 1` (`< 0`), so the sign alone tells robustness apart.
//!
//! # Examples
//!
//! ```
//! use pmutex::kind::{decode, encode, MutexKind, Robustness};
//!
//! let packed = encode(MutexKind::Recursive, Robustness::Robust);
//! assert_eq!(packed, -2);
//! assert_eq!(decode(packed), Ok((MutexKind::Recursive, Robustness::Robust)));
//! ```

use crate::Error;
use crate::Result;

/// The locking discipline of a mutex.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutexKind {
    /// Relocking by the owner is reported as [`Error::DeadlockDetected`].
    #[default]
    Normal,
    /// The owner may relock; each lock must be paired with an unlock.
    Recursive,
    /// Relocking by the owner is reported as [`Error::DeadlockDetected`].
    ErrorCheck,
}

impl MutexKind {
    pub const ALL: [MutexKind; 3] = [MutexKind::Normal, MutexKind::Recursive, MutexKind::ErrorCheck];

    pub const fn as_raw(self) -> i32 {
        match self {
            MutexKind::Normal => 0,
            MutexKind::Recursive => 1,
            MutexKind::ErrorCheck => 2,
        }
    }
}

impl TryFrom<i32> for MutexKind {
    type Error = Error;

    fn try_from(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(MutexKind::Normal),
            1 => Ok(MutexKind::Recursive),
            2 => Ok(MutexKind::ErrorCheck),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// Whether a mutex detects an owner that terminated while holding it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Robustness {
    /// An abandoned mutex stays locked forever.
    #[default]
    Stalled,
    /// An abandoned mutex is released and the next owner is told via
    /// [`LockOutcome::OwnerDied`](crate::LockOutcome::OwnerDied).
    Robust,
}

impl Robustness {
    pub const fn as_raw(self) -> i32 {
        match self {
            Robustness::Stalled => 0,
            Robustness::Robust => 1,
        }
    }

    pub const fn is_robust(self) -> bool {
        matches!(self, Robustness::Robust)
    }
}

impl TryFrom<i32> for Robustness {
    type Error = Error;

    fn try_from(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(Robustness::Stalled),
            1 => Ok(Robustness::Robust),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// Whether the state protected by a robust mutex can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsistencyState {
    Consistent,
    /// The previous owner terminated while holding the lock.
    Inconsistent,
    /// The lock was released while inconsistent; it cannot be locked again.
    NotRecoverable,
}

impl ConsistencyState {
    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            ConsistencyState::Consistent => 0,
            ConsistencyState::Inconsistent => 1,
            ConsistencyState::NotRecoverable => 2,
        }
    }

    pub(crate) const fn from_u8(v: u8) -> Self {
        match v {
            0 => ConsistencyState::Consistent,
            1 => ConsistencyState::Inconsistent,
            _ => ConsistencyState::NotRecoverable,
        }
    }
}

/// Packs `kind` and `robustness` into one signed integer.
pub const fn encode(kind: MutexKind, robustness: Robustness) -> i32 {
    match robustness {
        Robustness::Stalled => kind.as_raw(),
        Robustness::Robust => -kind.as_raw() - 1,
    }
}

/// Unpacks an integer produced by [`encode`].
///
/// Fails with [`Error::InvalidArgument`] for integers `encode` never produces.
pub fn decode(encoded: i32) -> Result<(MutexKind, Robustness)> {
    if encoded >= 0 {
        Ok((MutexKind::try_from(encoded)?, Robustness::Stalled))
    } else {
        Ok((MutexKind::try_from(-(encoded + 1))?, Robustness::Robust))
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_err;

    use super::*;

    #[test]
    fn test_decode_recovers_encoded_pair() {
        for kind in MutexKind::ALL {
            for robustness in [Robustness::Stalled, Robustness::Robust] {
                assert_eq!(decode(encode(kind, robustness)), Ok((kind, robustness)));
            }
        }
    }

    #[test]
    fn test_sign_tells_robustness() {
        for kind in MutexKind::ALL {
            assert!(encode(kind, Robustness::Stalled) >= 0);
            assert!(encode(kind, Robustness::Robust) < 0);
        }
        assert_eq!(encode(MutexKind::Normal, Robustness::Robust), -1);
        assert_eq!(encode(MutexKind::ErrorCheck, Robustness::Robust), -3);
    }

    #[test]
    fn test_decode_rejects_unknown() {
        assert_err!(decode(3));
        assert_err!(decode(-4));
        assert_err!(decode(i32::MIN));
        assert_eq!(decode(i32::MIN), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_consistency_state_round_trip() {
        for state in [
            ConsistencyState::Consistent,
            ConsistencyState::Inconsistent,
            ConsistencyState::NotRecoverable,
        ] {
            assert_eq!(ConsistencyState::from_u8(state.as_u8()), state);
        }
    }
}
