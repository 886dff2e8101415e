// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Xenomai/Cobalt domain.
//!
//! Binds the `__wrap_*` entry points exported by `libcobalt`. Cobalt rejects
//! primitive calls from threads it does not schedule with `EPERM`, which is
//! the mismatch the guarded wrappers recover from.

use super::{gettid, pthread_sched_params, Domain, SchedParams, Tid};
use crate::config::BootstrapConfig;
use crate::realtime::Bootstrapper;
use std::cell::UnsafeCell;
use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use tracing::{debug, warn};

#[link(name = "cobalt")]
extern "C" {
    fn xenomai_init(argcp: *mut c_int, argvp: *mut *const *mut c_char);

    fn __wrap_pthread_mutex_init(
        mutex: *mut libc::pthread_mutex_t,
        attr: *const libc::pthread_mutexattr_t,
    ) -> c_int;
    fn __wrap_pthread_mutex_destroy(mutex: *mut libc::pthread_mutex_t) -> c_int;
    fn __wrap_pthread_mutex_lock(mutex: *mut libc::pthread_mutex_t) -> c_int;
    fn __wrap_pthread_mutex_trylock(mutex: *mut libc::pthread_mutex_t) -> c_int;
    fn __wrap_pthread_mutex_unlock(mutex: *mut libc::pthread_mutex_t) -> c_int;

    fn __wrap_pthread_cond_init(
        cond: *mut libc::pthread_cond_t,
        attr: *const libc::pthread_condattr_t,
    ) -> c_int;
    fn __wrap_pthread_cond_destroy(cond: *mut libc::pthread_cond_t) -> c_int;
    fn __wrap_pthread_cond_wait(
        cond: *mut libc::pthread_cond_t,
        mutex: *mut libc::pthread_mutex_t,
    ) -> c_int;
    fn __wrap_pthread_cond_signal(cond: *mut libc::pthread_cond_t) -> c_int;
    fn __wrap_pthread_cond_broadcast(cond: *mut libc::pthread_cond_t) -> c_int;

    fn __wrap_sched_setscheduler(
        pid: libc::pid_t,
        policy: c_int,
        param: *const libc::sched_param,
    ) -> c_int;
}

/// Shared by every Cobalt context in the process.
static BOOTSTRAP: Bootstrapper = Bootstrapper::new();

/// Heap-pinned Cobalt mutex.
pub struct CobaltMutex(Box<UnsafeCell<libc::pthread_mutex_t>>);

/// Heap-pinned Cobalt condition variable.
pub struct CobaltCond(Box<UnsafeCell<libc::pthread_cond_t>>);

// SAFETY: Cobalt primitives are shared between threads by design and the
// box keeps their address stable.
unsafe impl Send for CobaltMutex {}
unsafe impl Sync for CobaltMutex {}
unsafe impl Send for CobaltCond {}
unsafe impl Sync for CobaltCond {}

/// Xenomai 3 Cobalt co-kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct CobaltDomain;

/// `__wrap_sched_setscheduler` follows `sched_setscheduler(2)`: 0 on
/// success, -1 with errno set on failure. Any other result, or -1 with no
/// errno, is reported as `EINVAL` so it is never read as success or as a
/// domain mismatch.
fn setscheduler_code(ret: c_int) -> i32 {
    match ret {
        0 => 0,
        -1 => match std::io::Error::last_os_error().raw_os_error() {
            Some(code) if code != 0 => code,
            _ => libc::EINVAL,
        },
        other => {
            debug!("Unexpected sched_setscheduler result {}", other);
            libc::EINVAL
        }
    }
}

impl Domain for CobaltDomain {
    type RawMutex = CobaltMutex;
    type RawCond = CobaltCond;

    fn name(&self) -> &'static str {
        "cobalt"
    }

    fn bootstrapper(&self) -> &Bootstrapper {
        &BOOTSTRAP
    }

    fn bootstrap(&self, config: &BootstrapConfig) {
        let args: Vec<CString> = config
            .argv()
            .into_iter()
            .filter_map(|arg| match CString::new(arg) {
                Ok(arg) => Some(arg),
                Err(e) => {
                    warn!("Dropping bootstrap argument with interior NUL: {}", e);
                    None
                }
            })
            .collect();

        // The runtime may keep pointers into argv, so it lives for the process.
        let args: &'static [CString] = Box::leak(args.into_boxed_slice());
        let mut ptrs: Vec<*mut c_char> = args.iter().map(|a| a.as_ptr() as *mut c_char).collect();
        ptrs.push(std::ptr::null_mut());
        let ptrs: &'static mut [*mut c_char] = Box::leak(ptrs.into_boxed_slice());

        let mut argc = args.len() as c_int;
        let mut argv = ptrs.as_ptr() as *const *mut c_char;
        debug!("Initializing Xenomai with {} args", argc);
        // SAFETY: argc/argv describe a NULL-terminated vector that outlives the call.
        unsafe { xenomai_init(&mut argc, &mut argv) };
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
        // SAFETY: param is valid for the duration of the call.
        setscheduler_code(unsafe { __wrap_sched_setscheduler(tid, params.policy, &param) })
    }

    fn mutex_init(&self) -> Result<CobaltMutex, i32> {
        let mutex = CobaltMutex(Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER)));
        // SAFETY: the pointer is valid and not yet shared.
        match unsafe { __wrap_pthread_mutex_init(mutex.0.get(), std::ptr::null()) } {
            0 => Ok(mutex),
            code => Err(code),
        }
    }

    fn mutex_destroy(&self, mutex: CobaltMutex) -> i32 {
        // SAFETY: sole owner of an initialized handle.
        unsafe { __wrap_pthread_mutex_destroy(mutex.0.get()) }
    }

    fn mutex_lock(&self, mutex: &CobaltMutex) -> i32 {
        // SAFETY: handle was initialized by mutex_init.
        unsafe { __wrap_pthread_mutex_lock(mutex.0.get()) }
    }

    fn mutex_try_lock(&self, mutex: &CobaltMutex) -> i32 {
        // SAFETY: handle was initialized by mutex_init.
        unsafe { __wrap_pthread_mutex_trylock(mutex.0.get()) }
    }

    fn mutex_unlock(&self, mutex: &CobaltMutex) -> i32 {
        // SAFETY: handle was initialized by mutex_init.
        unsafe { __wrap_pthread_mutex_unlock(mutex.0.get()) }
    }

    fn cond_init(&self) -> Result<CobaltCond, i32> {
        let cond = CobaltCond(Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER)));
        // SAFETY: the pointer is valid and not yet shared.
        match unsafe { __wrap_pthread_cond_init(cond.0.get(), std::ptr::null()) } {
            0 => Ok(cond),
            code => Err(code),
        }
    }

    fn cond_destroy(&self, cond: CobaltCond) -> i32 {
        // SAFETY: sole owner of an initialized handle.
        unsafe { __wrap_pthread_cond_destroy(cond.0.get()) }
    }

    fn cond_wait(&self, cond: &CobaltCond, mutex: &CobaltMutex) -> i32 {
        // SAFETY: both handles were initialized; the caller holds `mutex`.
        unsafe { __wrap_pthread_cond_wait(cond.0.get(), mutex.0.get()) }
    }

    fn cond_signal(&self, cond: &CobaltCond) -> i32 {
        // SAFETY: handle was initialized by cond_init.
        unsafe { __wrap_pthread_cond_signal(cond.0.get()) }
    }

    fn cond_broadcast(&self, cond: &CobaltCond) -> i32 {
        // SAFETY: handle was initialized by cond_init.
        unsafe { __wrap_pthread_cond_broadcast(cond.0.get()) }
    }
}
