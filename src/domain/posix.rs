// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Plain pthread domain.
//!
//! Used when no real-time co-kernel is linked. Every thread is already part
//! of this domain, so the migration path is reached only if a native call
//! genuinely reports `EPERM`.

use super::{gettid, pthread_sched_params, Domain, SchedParams, Tid};
use crate::config::BootstrapConfig;
use crate::realtime::Bootstrapper;
use std::cell::UnsafeCell;
use tracing::debug;

static BOOTSTRAP: Bootstrapper = Bootstrapper::new();

/// Heap-pinned `pthread_mutex_t`.
pub struct PosixMutex(Box<UnsafeCell<libc::pthread_mutex_t>>);

/// Heap-pinned `pthread_cond_t`.
pub struct PosixCond(Box<UnsafeCell<libc::pthread_cond_t>>);

// SAFETY: pthread primitives are designed to be shared between threads; the
// box keeps their address stable for their whole lifetime.
unsafe impl Send for PosixMutex {}
unsafe impl Sync for PosixMutex {}
unsafe impl Send for PosixCond {}
unsafe impl Sync for PosixCond {}

impl PosixMutex {
    fn get(&self) -> *mut libc::pthread_mutex_t {
        self.0.get()
    }
}

impl PosixCond {
    fn get(&self) -> *mut libc::pthread_cond_t {
        self.0.get()
    }
}

/// Linux pthreads with no real-time extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixDomain;

impl Domain for PosixDomain {
    type RawMutex = PosixMutex;
    type RawCond = PosixCond;

    fn name(&self) -> &'static str {
        "posix"
    }

    fn bootstrapper(&self) -> &Bootstrapper {
        &BOOTSTRAP
    }

    fn bootstrap(&self, config: &BootstrapConfig) {
        debug!("posix domain needs no bootstrap (argv {:?})", config.argv());
    }

    fn current_tid(&self) -> Tid {
        gettid()
    }

    fn sched_params(&self) -> Result<SchedParams, i32> {
        pthread_sched_params()
    }

    fn set_scheduler(&self, tid: Tid, params: &SchedParams) -> i32 {
        // SAFETY: sched_param is plain data.
        let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
        param.sched_priority = params.priority;
        // SAFETY: param is a valid pointer for the duration of the call.
        let ret = unsafe { libc::sched_setscheduler(tid, params.policy, &param) };
        if ret == 0 {
            0
        } else {
            std::io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or(libc::EINVAL)
        }
    }

    fn mutex_init(&self) -> Result<PosixMutex, i32> {
        let mutex = PosixMutex(Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER)));
        // SAFETY: the pointer is valid and not yet shared.
        match unsafe { libc::pthread_mutex_init(mutex.get(), std::ptr::null()) } {
            0 => Ok(mutex),
            code => Err(code),
        }
    }

    fn mutex_destroy(&self, mutex: PosixMutex) -> i32 {
        // SAFETY: ownership guarantees no other user of the handle remains.
        unsafe { libc::pthread_mutex_destroy(mutex.get()) }
    }

    fn mutex_lock(&self, mutex: &PosixMutex) -> i32 {
        // SAFETY: handle was initialized by mutex_init.
        unsafe { libc::pthread_mutex_lock(mutex.get()) }
    }

    fn mutex_try_lock(&self, mutex: &PosixMutex) -> i32 {
        // SAFETY: handle was initialized by mutex_init.
        unsafe { libc::pthread_mutex_trylock(mutex.get()) }
    }

    fn mutex_unlock(&self, mutex: &PosixMutex) -> i32 {
        // SAFETY: handle was initialized by mutex_init.
        unsafe { libc::pthread_mutex_unlock(mutex.get()) }
    }

    fn cond_init(&self) -> Result<PosixCond, i32> {
        let cond = PosixCond(Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER)));
        // SAFETY: the pointer is valid and not yet shared.
        match unsafe { libc::pthread_cond_init(cond.get(), std::ptr::null()) } {
            0 => Ok(cond),
            code => Err(code),
        }
    }

    fn cond_destroy(&self, cond: PosixCond) -> i32 {
        // SAFETY: ownership guarantees no other user of the handle remains.
        unsafe { libc::pthread_cond_destroy(cond.get()) }
    }

    fn cond_wait(&self, cond: &PosixCond, mutex: &PosixMutex) -> i32 {
        // SAFETY: both handles were initialized; the caller holds `mutex`.
        unsafe { libc::pthread_cond_wait(cond.get(), mutex.get()) }
    }

    fn cond_signal(&self, cond: &PosixCond) -> i32 {
        // SAFETY: handle was initialized by cond_init.
        unsafe { libc::pthread_cond_signal(cond.get()) }
    }

    fn cond_broadcast(&self, cond: &PosixCond) -> i32 {
        // SAFETY: handle was initialized by cond_init.
        unsafe { libc::pthread_cond_broadcast(cond.get()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutex_lifecycle() {
        let domain = PosixDomain;
        let mutex = domain.mutex_init().unwrap();
        assert_eq!(domain.mutex_lock(&mutex), 0);
        assert_eq!(domain.mutex_try_lock(&mutex), libc::EBUSY);
        assert_eq!(domain.mutex_unlock(&mutex), 0);
        assert_eq!(domain.mutex_try_lock(&mutex), 0);
        assert_eq!(domain.mutex_unlock(&mutex), 0);
        assert_eq!(domain.mutex_destroy(mutex), 0);
    }

    #[test]
    fn test_registering_with_current_params() {
        let domain = PosixDomain;
        let params = domain.sched_params().unwrap();
        assert_eq!(domain.set_scheduler(domain.current_tid(), &params), 0);
    }
}
