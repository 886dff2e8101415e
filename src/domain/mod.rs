// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Real-time scheduling domains.
//!
//! A [`Domain`] is the set of native calls the guarded primitives are built
//! on: domain-scoped mutexes and condition variables, a per-thread
//! scheduler-registration call and a process-wide bootstrap entry point.
//!
//! All native calls report a POSIX-style code: `0` on success, a positive
//! errno otherwise. [`Outcome::from_code`] turns that code into the only
//! distinction the retry protocol cares about.

#[cfg(feature = "cobalt")]
pub mod cobalt;
pub mod posix;
pub mod sim;

use crate::config::BootstrapConfig;
use crate::realtime::Bootstrapper;
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "cobalt")]
pub use cobalt::CobaltDomain;
pub use posix::PosixDomain;
pub use sim::{Fault, SimDomain};

/// Domain used by [`crate::RtMutex::new`] and [`crate::RtCondvar::new`].
#[cfg(feature = "cobalt")]
pub type DefaultDomain = CobaltDomain;
/// Domain used by [`crate::RtMutex::new`] and [`crate::RtCondvar::new`].
#[cfg(not(feature = "cobalt"))]
pub type DefaultDomain = PosixDomain;

/// OS thread id, as returned by `gettid(2)`.
pub type Tid = libc::pid_t;

/// The code a real-time domain returns when an unregistered thread touches
/// one of its primitives.
pub const DOMAIN_MISMATCH: i32 = libc::EPERM;

/// Classification of a native result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Thread is not registered in the domain; retryable after migration.
    DomainMismatch,
    /// Anything else. Never retried.
    Fatal(i32),
}

impl Outcome {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Outcome::Success,
            DOMAIN_MISMATCH => Outcome::DomainMismatch,
            other => Outcome::Fatal(other),
        }
    }
}

/// Native operations, used for diagnostics and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Bootstrap,
    GetSchedParams,
    SetScheduler,
    MutexInit,
    MutexDestroy,
    Lock,
    TryLock,
    Unlock,
    CondInit,
    CondDestroy,
    Wait,
    NotifyOne,
    NotifyAll,
}

impl Primitive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Primitive::Bootstrap => "bootstrap",
            Primitive::GetSchedParams => "get_sched_params",
            Primitive::SetScheduler => "set_scheduler",
            Primitive::MutexInit => "mutex_init",
            Primitive::MutexDestroy => "mutex_destroy",
            Primitive::Lock => "lock",
            Primitive::TryLock => "try_lock",
            Primitive::Unlock => "unlock",
            Primitive::CondInit => "cond_init",
            Primitive::CondDestroy => "cond_destroy",
            Primitive::Wait => "wait",
            Primitive::NotifyOne => "notify_one",
            Primitive::NotifyAll => "notify_all",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling policy and priority of a thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedParams {
    pub policy: i32,
    pub priority: i32,
}

/// Native calls of a real-time scheduling domain.
///
/// Raw handles are owned by the guarded wrappers; implementations may
/// assume every handle passed in was produced by their own `*_init` and
/// has not been destroyed.
pub trait Domain: Send + Sync + 'static {
    type RawMutex: Send + Sync;
    type RawCond: Send + Sync;

    /// Short name for log output.
    fn name(&self) -> &'static str;

    /// Process-wide one-shot guard for [`Domain::bootstrap`].
    fn bootstrapper(&self) -> &Bootstrapper;

    /// Initialize the runtime. Only ever called through [`Domain::bootstrapper`].
    fn bootstrap(&self, config: &BootstrapConfig);

    /// Map a native result to an [`Outcome`].
    fn classify(&self, code: i32) -> Outcome {
        Outcome::from_code(code)
    }

    fn current_tid(&self) -> Tid;

    /// Current thread's scheduling policy and parameters.
    fn sched_params(&self) -> Result<SchedParams, i32>;

    /// Register `tid` with the domain's scheduler.
    fn set_scheduler(&self, tid: Tid, params: &SchedParams) -> i32;

    fn mutex_init(&self) -> Result<Self::RawMutex, i32>;
    fn mutex_destroy(&self, mutex: Self::RawMutex) -> i32;
    fn mutex_lock(&self, mutex: &Self::RawMutex) -> i32;
    fn mutex_try_lock(&self, mutex: &Self::RawMutex) -> i32;
    fn mutex_unlock(&self, mutex: &Self::RawMutex) -> i32;

    fn cond_init(&self) -> Result<Self::RawCond, i32>;
    fn cond_destroy(&self, cond: Self::RawCond) -> i32;
    /// Atomically release `mutex`, wait for a signal, and reacquire it.
    fn cond_wait(&self, cond: &Self::RawCond, mutex: &Self::RawMutex) -> i32;
    fn cond_signal(&self, cond: &Self::RawCond) -> i32;
    fn cond_broadcast(&self, cond: &Self::RawCond) -> i32;
}

/// Kernel thread id of the caller.
pub(crate) fn gettid() -> Tid {
    // SAFETY: gettid takes no arguments and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as Tid }
}

/// Scheduling policy and parameters of the calling pthread.
pub(crate) fn pthread_sched_params() -> Result<SchedParams, i32> {
    let mut policy: libc::c_int = 0;
    // SAFETY: sched_param is plain data; zeroed is a valid value.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    // SAFETY: both out-pointers are valid for writes.
    let ret = unsafe { libc::pthread_getschedparam(libc::pthread_self(), &mut policy, &mut param) };
    if ret != 0 {
        return Err(ret);
    }
    Ok(SchedParams {
        policy,
        priority: param.sched_priority,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(Outcome::from_code(0), Outcome::Success);
        assert_eq!(Outcome::from_code(libc::EPERM), Outcome::DomainMismatch);
        assert_eq!(Outcome::from_code(libc::EBUSY), Outcome::Fatal(libc::EBUSY));
        assert_eq!(Outcome::from_code(libc::EINVAL), Outcome::Fatal(libc::EINVAL));
    }

    #[test]
    fn test_primitive_names() {
        assert_eq!(Primitive::TryLock.to_string(), "try_lock");
        assert_eq!(Primitive::NotifyAll.to_string(), "notify_all");
    }
}
