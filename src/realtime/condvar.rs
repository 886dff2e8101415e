// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Condition variable backed by a real-time domain primitive.
//!
//! Real-time kernels may require the associated mutex to be held when
//! notifying (Xenomai optimizes wakeups under that assumption), so notify
//! with the mutex locked.
//!
//! ```ignore
//! use rtlock::{RtCondvar, RtMutex};
//!
//! let mutex = RtMutex::new();
//! let cond = RtCondvar::new();
//!
//! let mut guard = mutex.lock()?;
//! cond.wait_while(&mut guard, || !ready.load(Ordering::Acquire))?;
//! ```

use super::mutex::RtMutexGuard;
use super::retry::{create_guarded, run_guarded};
use super::Realtime;
use crate::domain::{DefaultDomain, Domain, Primitive};
use crate::error::RtError;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// A condition variable in a real-time scheduling domain that registers
/// calling threads on demand.
///
/// Construction and disabling follow [`super::RtMutex`]. Dropping an
/// enabled condition variable wakes all waiters before the native handle
/// is destroyed.
pub struct RtCondvar<D: Domain = DefaultDomain> {
    rt: Arc<Realtime<D>>,
    /// `None` when disabled.
    raw: Option<D::RawCond>,
}

impl RtCondvar<DefaultDomain> {
    /// Create a condition variable in the process-wide default domain.
    pub fn new() -> Self {
        Self::with_runtime(Realtime::global())
    }
}

impl Default for RtCondvar<DefaultDomain> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Domain> RtCondvar<D> {
    /// Create a condition variable in the given context.
    pub fn with_runtime(rt: Arc<Realtime<D>>) -> Self {
        trace!("Construct condition variable");
        let raw = create_guarded(&rt, Primitive::CondInit, || rt.domain().cond_init());
        Self { rt, raw }
    }

    pub fn is_enabled(&self) -> bool {
        self.raw.is_some()
    }

    pub fn runtime(&self) -> &Arc<Realtime<D>> {
        &self.rt
    }

    /// Release the guard's mutex, wait for a notification and reacquire it.
    ///
    /// Wakeups may be spurious. On error the wait did not happen: the mutex
    /// is still held but no notification was consumed, so callers looping on
    /// a condition must stop on `Err` rather than spin.
    pub fn wait(&self, guard: &mut RtMutexGuard<'_, D>) -> Result<(), RtError> {
        let cond = self.raw.as_ref().ok_or(RtError::Disabled(Primitive::Wait))?;
        let mutex = guard
            .mutex()
            .raw()
            .ok_or(RtError::Disabled(Primitive::Wait))?;
        run_guarded(&self.rt, Primitive::Wait, || {
            self.rt.domain().cond_wait(cond, mutex)
        })
    }

    /// Wait until `condition` returns false.
    pub fn wait_while(
        &self,
        guard: &mut RtMutexGuard<'_, D>,
        mut condition: impl FnMut() -> bool,
    ) -> Result<(), RtError> {
        while condition() {
            self.wait(guard)?;
        }
        Ok(())
    }

    /// Wake one waiter.
    pub fn notify_one(&self) -> Result<(), RtError> {
        let cond = self
            .raw
            .as_ref()
            .ok_or(RtError::Disabled(Primitive::NotifyOne))?;
        run_guarded(&self.rt, Primitive::NotifyOne, || {
            self.rt.domain().cond_signal(cond)
        })
    }

    /// Wake all waiters.
    pub fn notify_all(&self) -> Result<(), RtError> {
        let cond = self
            .raw
            .as_ref()
            .ok_or(RtError::Disabled(Primitive::NotifyAll))?;
        run_guarded(&self.rt, Primitive::NotifyAll, || {
            self.rt.domain().cond_broadcast(cond)
        })
    }
}

impl<D: Domain> Drop for RtCondvar<D> {
    fn drop(&mut self) {
        if self.raw.is_none() {
            return;
        }
        if let Err(e) = self.notify_all() {
            debug!("Broadcast before destroying condition variable failed: {}", e);
        }
        if let Some(raw) = self.raw.take() {
            trace!("Destroy condition variable");
            let code = self.rt.domain().cond_destroy(raw);
            if code != 0 {
                debug!("cond_destroy returned {}", code);
            }
        }
    }
}

impl<D: Domain> fmt::Debug for RtCondvar<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtCondvar")
            .field("domain", &self.rt.domain().name())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
