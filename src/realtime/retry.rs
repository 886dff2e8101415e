// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Bounded detect-migrate-retry loop shared by all guarded operations.

use super::Realtime;
use crate::domain::{Domain, Outcome, Primitive};
use crate::error::{strerror, RtError};
use tracing::{error, trace};

/// Position in the at-most-two-attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    First,
    Retry,
}

impl Attempt {
    /// The attempt after this one, if any remain.
    pub(crate) fn next(self) -> Option<Attempt> {
        match self {
            Attempt::First => Some(Attempt::Retry),
            Attempt::Retry => None,
        }
    }

    pub(crate) fn is_retry(self) -> bool {
        self == Attempt::Retry
    }
}

/// Run `call`; on a domain mismatch migrate the caller and replay it once.
pub(crate) fn run_guarded<D: Domain>(
    rt: &Realtime<D>,
    op: Primitive,
    mut call: impl FnMut() -> i32,
) -> Result<(), RtError> {
    let mut attempt = Attempt::First;
    loop {
        let code = call();
        match rt.domain().classify(code) {
            Outcome::Success => return Ok(()),
            Outcome::Fatal(code) => {
                trace!("{} failed: {}", op, strerror(&code));
                return Err(RtError::Primitive { op, code });
            }
            Outcome::DomainMismatch => {
                attempt = match attempt.next() {
                    Some(next) => next,
                    None => {
                        trace!("{} failed after migration", op);
                        return Err(RtError::DomainMismatch { op });
                    }
                };
                trace!("{} hit a domain mismatch, migrating thread", op);
                rt.migrate_current_thread()?;
                rt.stats().retries.increment();
            }
        }
    }
}

/// Create a native primitive, bootstrapping and retrying once on a domain
/// mismatch. `None` means the primitive is permanently disabled.
pub(crate) fn create_guarded<D: Domain, H>(
    rt: &Realtime<D>,
    op: Primitive,
    mut init: impl FnMut() -> Result<H, i32>,
) -> Option<H> {
    let mut attempt = Attempt::First;
    loop {
        let code = match init() {
            Ok(handle) => return Some(handle),
            Err(code) => code,
        };
        let retry = match rt.domain().classify(code) {
            Outcome::DomainMismatch => attempt.next(),
            _ => None,
        };
        match retry {
            Some(next) => {
                trace!("{} returned a domain mismatch, bootstrapping", op);
                rt.bootstrap();
                attempt = next;
            }
            None => {
                error!("Unable to create primitive ({}): {}", op, strerror(&code));
                rt.stats().disabled.increment();
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Fault, SimDomain};

    #[test]
    fn test_attempt_sequence() {
        assert_eq!(Attempt::First.next(), Some(Attempt::Retry));
        assert_eq!(Attempt::Retry.next(), None);
        assert!(Attempt::Retry.is_retry());
    }

    #[test]
    fn test_fatal_is_not_retried() {
        let rt = Realtime::with_domain(SimDomain::new());
        let mut calls = 0;
        let result = run_guarded(&rt, Primitive::Lock, || {
            calls += 1;
            libc::EINVAL
        });
        assert_eq!(
            result,
            Err(RtError::Primitive {
                op: Primitive::Lock,
                code: libc::EINVAL
            })
        );
        assert_eq!(calls, 1);
        assert_eq!(rt.stats().snapshot().migrations, 0);
    }

    #[test]
    fn test_mismatch_is_replayed_once() {
        let rt = Realtime::with_domain(SimDomain::new());
        let mut calls = 0;
        let result = run_guarded(&rt, Primitive::Unlock, || {
            calls += 1;
            libc::EPERM
        });
        assert_eq!(
            result,
            Err(RtError::DomainMismatch {
                op: Primitive::Unlock
            })
        );
        assert_eq!(calls, 2);
        let snap = rt.stats().snapshot();
        assert_eq!(snap.migrations, 1);
        assert_eq!(snap.retries, 1);
    }

    #[test]
    fn test_failed_migration_stops_replay() {
        let sim = SimDomain::builder()
            .fault(Primitive::SetScheduler, Fault::Always(libc::EPERM))
            .build();
        let rt = Realtime::with_domain(sim.clone());
        let mut calls = 0;
        let result = run_guarded(&rt, Primitive::NotifyOne, || {
            calls += 1;
            libc::EPERM
        });
        assert!(matches!(result, Err(RtError::Migration { .. })));
        assert_eq!(calls, 1);
        assert_eq!(sim.calls(Primitive::SetScheduler), 2);
    }

    #[test]
    fn test_create_bootstraps_on_mismatch() {
        let sim = SimDomain::new();
        let rt = Realtime::with_domain(sim.clone());
        let mut calls = 0;
        let handle = create_guarded(&rt, Primitive::MutexInit, || {
            calls += 1;
            if calls == 1 {
                Err(libc::EPERM)
            } else {
                Ok(7)
            }
        });
        assert_eq!(handle, Some(7));
        assert!(sim.is_bootstrapped());
    }

    #[test]
    fn test_create_other_error_disables_without_bootstrap() {
        let sim = SimDomain::new();
        let rt = Realtime::with_domain(sim.clone());
        let handle: Option<()> = create_guarded(&rt, Primitive::CondInit, || Err(libc::ENOMEM));
        assert!(handle.is_none());
        assert!(!sim.is_bootstrapped());
        assert_eq!(rt.stats().snapshot().disabled, 1);
    }
}
