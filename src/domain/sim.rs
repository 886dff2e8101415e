// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-process simulated real-time domain.
//!
//! Behaves like a co-kernel that insists on bootstrap and per-thread
//! registration, with optional fault injection. Every native call is counted
//! and appended to an ordered event log so tests can assert on exactly what
//! the guarded wrappers did.
//!
//! # Example
//!
//! ```
//! use rtlock::domain::{Fault, Primitive, SimDomain};
//!
//! let sim = SimDomain::builder()
//!     .requires_registration()
//!     .fault(Primitive::MutexInit, Fault::Times(1, libc::EPERM))
//!     .build();
//! assert_eq!(sim.calls(Primitive::Lock), 0);
//! ```

use super::{Domain, Primitive, SchedParams, Tid, DOMAIN_MISMATCH};
use crate::config::BootstrapConfig;
use crate::realtime::Bootstrapper;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tracing::trace;

static NEXT_TID: AtomicI32 = AtomicI32::new(1);

thread_local! {
    static SIM_TID: Tid = NEXT_TID.fetch_add(1, Ordering::Relaxed);
}

/// An injected native failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail every call with this code.
    Always(i32),
    /// Fail the next `n` calls with this code, then behave normally.
    Times(usize, i32),
}

struct SimState {
    bootstrapper: Bootstrapper,
    requires_bootstrap: bool,
    requires_registration: bool,
    bootstrapped: AtomicBool,
    bootstrap_argv: Mutex<Option<Vec<String>>>,
    sched_params: SchedParams,
    registered: Mutex<HashMap<Tid, SchedParams>>,
    faults: Mutex<HashMap<Primitive, Fault>>,
    calls: Mutex<HashMap<Primitive, usize>>,
    events: Mutex<Vec<Primitive>>,
}

/// Simulated domain handle. Clones share state.
#[derive(Clone)]
pub struct SimDomain {
    state: Arc<SimState>,
}

/// Builder for [`SimDomain`] fault profiles.
#[derive(Debug, Default)]
pub struct SimDomainBuilder {
    requires_bootstrap: bool,
    requires_registration: bool,
    sched_params: SchedParams,
    faults: HashMap<Primitive, Fault>,
}

impl SimDomainBuilder {
    /// Primitive creation and registration fail with `EPERM` until bootstrapped.
    pub fn requires_bootstrap(mut self) -> Self {
        self.requires_bootstrap = true;
        self
    }

    /// Per-thread operations fail with `EPERM` for unregistered threads.
    pub fn requires_registration(mut self) -> Self {
        self.requires_registration = true;
        self
    }

    /// Scheduling params every simulated thread reports.
    pub fn sched_params(mut self, params: SchedParams) -> Self {
        self.sched_params = params;
        self
    }

    pub fn fault(mut self, op: Primitive, fault: Fault) -> Self {
        self.faults.insert(op, fault);
        self
    }

    pub fn build(self) -> SimDomain {
        SimDomain {
            state: Arc::new(SimState {
                bootstrapper: Bootstrapper::new(),
                requires_bootstrap: self.requires_bootstrap,
                requires_registration: self.requires_registration,
                bootstrapped: AtomicBool::new(false),
                bootstrap_argv: Mutex::new(None),
                sched_params: self.sched_params,
                registered: Mutex::new(HashMap::new()),
                faults: Mutex::new(self.faults),
                calls: Mutex::new(HashMap::new()),
                events: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl Default for SimDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDomain {
    /// A domain where every call succeeds.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> SimDomainBuilder {
        SimDomainBuilder::default()
    }

    /// Simulated thread id of the caller.
    pub fn tid() -> Tid {
        SIM_TID.with(|tid| *tid)
    }

    pub fn inject(&self, op: Primitive, fault: Fault) {
        self.state.faults.lock().insert(op, fault);
    }

    pub fn clear_faults(&self) {
        self.state.faults.lock().clear();
    }

    /// Number of native calls made for `op`.
    pub fn calls(&self, op: Primitive) -> usize {
        self.state.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Every native call in the order it was made.
    pub fn events(&self) -> Vec<Primitive> {
        self.state.events.lock().clone()
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.state.bootstrapped.load(Ordering::Acquire)
    }

    /// Arguments the runtime was bootstrapped with.
    pub fn bootstrap_argv(&self) -> Option<Vec<String>> {
        self.state.bootstrap_argv.lock().clone()
    }

    pub fn is_registered(&self, tid: Tid) -> bool {
        self.state.registered.lock().contains_key(&tid)
    }

    /// Params `tid` was registered with.
    pub fn registered_params(&self, tid: Tid) -> Option<SchedParams> {
        self.state.registered.lock().get(&tid).copied()
    }

    /// Record a call and decide its result before any simulated work.
    fn enter(&self, op: Primitive) -> i32 {
        *self.state.calls.lock().entry(op).or_insert(0) += 1;
        self.state.events.lock().push(op);

        if let Some(code) = self.take_fault(op) {
            trace!("sim: injected {} for {}", code, op);
            return code;
        }

        let needs_bootstrap = matches!(
            op,
            Primitive::MutexInit | Primitive::CondInit | Primitive::SetScheduler
        );
        if needs_bootstrap && self.state.requires_bootstrap && !self.is_bootstrapped() {
            return DOMAIN_MISMATCH;
        }

        let needs_registration = matches!(
            op,
            Primitive::Lock
                | Primitive::TryLock
                | Primitive::Unlock
                | Primitive::Wait
                | Primitive::NotifyOne
                | Primitive::NotifyAll
        );
        if needs_registration && self.state.requires_registration && !self.is_registered(Self::tid())
        {
            return DOMAIN_MISMATCH;
        }
        0
    }

    fn take_fault(&self, op: Primitive) -> Option<i32> {
        let mut faults = self.state.faults.lock();
        let (code, left) = match *faults.get(&op)? {
            Fault::Always(code) => return Some(code),
            Fault::Times(left, code) => (code, left),
        };
        match left {
            0 => {
                faults.remove(&op);
                None
            }
            1 => {
                faults.remove(&op);
                Some(code)
            }
            n => {
                faults.insert(op, Fault::Times(n - 1, code));
                Some(code)
            }
        }
    }
}

/// Simulated mutex: owner tid plus a wakeup for blocked lockers.
pub struct SimMutex {
    owner: Mutex<Option<Tid>>,
    released: Condvar,
}

impl SimMutex {
    fn new() -> Self {
        Self {
            owner: Mutex::new(None),
            released: Condvar::new(),
        }
    }

    fn acquire(&self, tid: Tid) {
        let mut owner = self.owner.lock();
        while owner.is_some() {
            self.released.wait(&mut owner);
        }
        *owner = Some(tid);
    }

    fn release(&self) {
        *self.owner.lock() = None;
        self.released.notify_one();
    }

    fn is_owned_by(&self, tid: Tid) -> bool {
        *self.owner.lock() == Some(tid)
    }
}

/// Simulated condition variable: a signal sequence number.
pub struct SimCond {
    seq: Mutex<u64>,
    changed: Condvar,
}

impl SimCond {
    fn new() -> Self {
        Self {
            seq: Mutex::new(0),
            changed: Condvar::new(),
        }
    }
}

impl Domain for SimDomain {
    type RawMutex = SimMutex;
    type RawCond = SimCond;

    fn name(&self) -> &'static str {
        "sim"
    }

    fn bootstrapper(&self) -> &Bootstrapper {
        &self.state.bootstrapper
    }

    fn bootstrap(&self, config: &BootstrapConfig) {
        self.enter(Primitive::Bootstrap);
        *self.state.bootstrap_argv.lock() = Some(config.argv());
        self.state.bootstrapped.store(true, Ordering::Release);
    }

    fn current_tid(&self) -> Tid {
        Self::tid()
    }

    fn sched_params(&self) -> Result<SchedParams, i32> {
        match self.enter(Primitive::GetSchedParams) {
            0 => Ok(self.state.sched_params),
            code => Err(code),
        }
    }

    fn set_scheduler(&self, tid: Tid, params: &SchedParams) -> i32 {
        let code = self.enter(Primitive::SetScheduler);
        if code == 0 {
            self.state.registered.lock().insert(tid, *params);
        }
        code
    }

    fn mutex_init(&self) -> Result<SimMutex, i32> {
        match self.enter(Primitive::MutexInit) {
            0 => Ok(SimMutex::new()),
            code => Err(code),
        }
    }

    fn mutex_destroy(&self, _mutex: SimMutex) -> i32 {
        self.enter(Primitive::MutexDestroy)
    }

    fn mutex_lock(&self, mutex: &SimMutex) -> i32 {
        let code = self.enter(Primitive::Lock);
        if code != 0 {
            return code;
        }
        let tid = Self::tid();
        if mutex.is_owned_by(tid) {
            return libc::EDEADLK;
        }
        mutex.acquire(tid);
        0
    }

    fn mutex_try_lock(&self, mutex: &SimMutex) -> i32 {
        let code = self.enter(Primitive::TryLock);
        if code != 0 {
            return code;
        }
        let mut owner = mutex.owner.lock();
        if owner.is_some() {
            return libc::EBUSY;
        }
        *owner = Some(Self::tid());
        0
    }

    fn mutex_unlock(&self, mutex: &SimMutex) -> i32 {
        let code = self.enter(Primitive::Unlock);
        if code != 0 {
            return code;
        }
        // Only the owner may unlock. POSIX says EPERM here, which the
        // wrappers cannot tell from a domain mismatch, so report EINVAL.
        if !mutex.is_owned_by(Self::tid()) {
            return libc::EINVAL;
        }
        mutex.release();
        0
    }

    fn cond_init(&self) -> Result<SimCond, i32> {
        match self.enter(Primitive::CondInit) {
            0 => Ok(SimCond::new()),
            code => Err(code),
        }
    }

    fn cond_destroy(&self, _cond: SimCond) -> i32 {
        self.enter(Primitive::CondDestroy)
    }

    fn cond_wait(&self, cond: &SimCond, mutex: &SimMutex) -> i32 {
        let code = self.enter(Primitive::Wait);
        if code != 0 {
            return code;
        }
        let tid = Self::tid();
        if !mutex.is_owned_by(tid) {
            return libc::EINVAL;
        }

        // Holding `seq` across the release makes release-and-wait atomic
        // with respect to signalers.
        let mut seq = cond.seq.lock();
        let start = *seq;
        mutex.release();
        while *seq == start {
            cond.changed.wait(&mut seq);
        }
        drop(seq);
        mutex.acquire(tid);
        0
    }

    fn cond_signal(&self, cond: &SimCond) -> i32 {
        let code = self.enter(Primitive::NotifyOne);
        if code != 0 {
            return code;
        }
        *cond.seq.lock() += 1;
        cond.changed.notify_one();
        0
    }

    fn cond_broadcast(&self, cond: &SimCond) -> i32 {
        let code = self.enter(Primitive::NotifyAll);
        if code != 0 {
            return code;
        }
        *cond.seq.lock() += 1;
        cond.changed.notify_all();
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_times_fault_expires() {
        let sim = SimDomain::builder()
            .fault(Primitive::MutexInit, Fault::Times(2, libc::ENOMEM))
            .build();
        assert_eq!(sim.mutex_init().err(), Some(libc::ENOMEM));
        assert_eq!(sim.mutex_init().err(), Some(libc::ENOMEM));
        assert!(sim.mutex_init().is_ok());
        assert_eq!(sim.calls(Primitive::MutexInit), 3);
    }

    #[test]
    fn test_registration_required() {
        let sim = SimDomain::builder().requires_registration().build();
        let mutex = sim.mutex_init().unwrap();
        assert_eq!(sim.mutex_lock(&mutex), DOMAIN_MISMATCH);

        assert_eq!(sim.set_scheduler(SimDomain::tid(), &SchedParams::default()), 0);
        assert!(sim.is_registered(SimDomain::tid()));
        assert_eq!(sim.mutex_lock(&mutex), 0);
        assert_eq!(sim.mutex_unlock(&mutex), 0);
    }

    #[test]
    fn test_bootstrap_required() {
        let sim = SimDomain::builder().requires_bootstrap().build();
        assert_eq!(sim.cond_init().err(), Some(DOMAIN_MISMATCH));
        sim.bootstrap(&BootstrapConfig::default());
        assert!(sim.is_bootstrapped());
        assert!(sim.cond_init().is_ok());
        assert_eq!(
            sim.events(),
            vec![Primitive::CondInit, Primitive::Bootstrap, Primitive::CondInit]
        );
    }

    #[test]
    fn test_mutex_exclusion() {
        let sim = SimDomain::new();
        let mutex = sim.mutex_init().unwrap();
        assert_eq!(sim.mutex_try_lock(&mutex), 0);
        assert_eq!(sim.mutex_try_lock(&mutex), libc::EBUSY);
        assert_eq!(sim.mutex_lock(&mutex), libc::EDEADLK);
        assert_eq!(sim.mutex_unlock(&mutex), 0);
        assert_eq!(sim.mutex_unlock(&mutex), libc::EINVAL);
    }

    #[test]
    fn test_distinct_thread_ids() {
        let here = SimDomain::tid();
        let there = std::thread::spawn(SimDomain::tid).join().unwrap();
        assert_ne!(here, there);
        assert_eq!(here, SimDomain::tid());
    }
}
