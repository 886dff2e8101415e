// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error types for guarded real-time primitives.

use crate::domain::{Primitive, Tid};
use thiserror::Error;

/// Failure of a guarded primitive operation.
///
/// None of these are raised as panics: guarded operations return them and
/// the caller decides whether a failed `lock` or `wait` is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtError {
    /// The object was never created successfully and is permanently inert.
    #[error("{0} unavailable: primitive is disabled")]
    Disabled(Primitive),

    /// The native primitive could not be created, even after bootstrapping.
    #[error("unable to create primitive ({op}): {}", strerror(.code))]
    Construction { op: Primitive, code: i32 },

    /// The thread was migrated but the call still reported a domain mismatch.
    #[error("{op} still rejected after migrating thread into the real-time domain")]
    DomainMismatch { op: Primitive },

    /// Any other non-zero native result.
    #[error("{op} failed: {}", strerror(.code))]
    Primitive { op: Primitive, code: i32 },

    /// The thread could not be registered with the real-time scheduler.
    #[error("unable to turn thread {tid} into a real-time thread: {}", strerror(.code))]
    Migration { tid: Tid, code: i32 },
}

impl RtError {
    /// Native error code carried by this error, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            RtError::Construction { code, .. }
            | RtError::Primitive { code, .. }
            | RtError::Migration { code, .. } => Some(*code),
            RtError::Disabled(_) | RtError::DomainMismatch { .. } => None,
        }
    }

    /// True when the primitive was simply busy (`EBUSY` from `try_lock`).
    pub fn is_busy(&self) -> bool {
        matches!(self, RtError::Primitive { code, .. } if *code == libc::EBUSY)
    }
}

/// Render a positive errno value as the OS description.
pub(crate) fn strerror(code: &i32) -> String {
    format!("({}) {}", code, std::io::Error::from_raw_os_error(*code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_errno_text() {
        let err = RtError::Primitive {
            op: Primitive::Lock,
            code: libc::EINVAL,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("lock failed: (22)"));
        assert_eq!(err.code(), Some(libc::EINVAL));
    }

    #[test]
    fn test_busy_detection() {
        let busy = RtError::Primitive {
            op: Primitive::TryLock,
            code: libc::EBUSY,
        };
        assert!(busy.is_busy());
        assert!(!RtError::Disabled(Primitive::TryLock).is_busy());
        assert_eq!(RtError::DomainMismatch { op: Primitive::Lock }.code(), None);
    }
}
