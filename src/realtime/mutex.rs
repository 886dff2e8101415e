// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mutex backed by a real-time domain primitive.
//!
//! # Example
//!
//! ```ignore
//! use rtlock::RtMutex;
//!
//! let mutex = RtMutex::new();
//! {
//!     let _guard = mutex.lock()?;
//!     // critical section
//! }
//! ```

use super::retry::{create_guarded, run_guarded};
use super::Realtime;
use crate::domain::{DefaultDomain, Domain, Primitive};
use crate::error::RtError;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A mutex in a real-time scheduling domain that registers calling threads
/// on demand.
///
/// If the native mutex cannot be created the object is still constructed,
/// but disabled: every operation fails with [`RtError::Disabled`] without
/// touching a native handle. A disabled mutex never recovers.
pub struct RtMutex<D: Domain = DefaultDomain> {
    rt: Arc<Realtime<D>>,
    /// `None` when disabled.
    raw: Option<D::RawMutex>,
}

impl RtMutex<DefaultDomain> {
    /// Create a mutex in the process-wide default domain.
    pub fn new() -> Self {
        Self::with_runtime(Realtime::global())
    }
}

impl Default for RtMutex<DefaultDomain> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Domain> RtMutex<D> {
    /// Create a mutex in the given context.
    pub fn with_runtime(rt: Arc<Realtime<D>>) -> Self {
        trace!("Construct mutex");
        let raw = create_guarded(&rt, Primitive::MutexInit, || rt.domain().mutex_init());
        Self { rt, raw }
    }

    pub fn is_enabled(&self) -> bool {
        self.raw.is_some()
    }

    pub fn runtime(&self) -> &Arc<Realtime<D>> {
        &self.rt
    }

    /// Native handle, for the condition variable's wait.
    pub(crate) fn raw(&self) -> Option<&D::RawMutex> {
        self.raw.as_ref()
    }

    /// Block until the mutex is acquired.
    ///
    /// An error means the lock was NOT acquired.
    pub fn lock(&self) -> Result<RtMutexGuard<'_, D>, RtError> {
        let raw = self.raw.as_ref().ok_or(RtError::Disabled(Primitive::Lock))?;
        run_guarded(&self.rt, Primitive::Lock, || self.rt.domain().mutex_lock(raw))?;
        Ok(RtMutexGuard::new(self))
    }

    /// Acquire the mutex if it is free.
    ///
    /// Returns `None` when the mutex is held elsewhere or when acquiring
    /// failed for any other reason; use [`RtMutex::try_lock_checked`] to
    /// tell those apart.
    pub fn try_lock(&self) -> Option<RtMutexGuard<'_, D>> {
        match self.try_lock_checked() {
            Ok(guard) => guard,
            Err(e) => {
                debug!("try_lock failed: {}", e);
                None
            }
        }
    }

    /// Like [`RtMutex::try_lock`], but reports failures other than "busy".
    pub fn try_lock_checked(&self) -> Result<Option<RtMutexGuard<'_, D>>, RtError> {
        let raw = self
            .raw
            .as_ref()
            .ok_or(RtError::Disabled(Primitive::TryLock))?;
        match run_guarded(&self.rt, Primitive::TryLock, || {
            self.rt.domain().mutex_try_lock(raw)
        }) {
            Ok(()) => Ok(Some(RtMutexGuard::new(self))),
            Err(e) if e.is_busy() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Release the mutex without a guard.
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock, and the guard that was
    /// returned for it must have been forgotten.
    pub unsafe fn force_unlock(&self) -> Result<(), RtError> {
        self.unlock_raw()
    }

    fn unlock_raw(&self) -> Result<(), RtError> {
        let raw = self
            .raw
            .as_ref()
            .ok_or(RtError::Disabled(Primitive::Unlock))?;
        run_guarded(&self.rt, Primitive::Unlock, || {
            self.rt.domain().mutex_unlock(raw)
        })
    }
}

impl<D: Domain> Drop for RtMutex<D> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            trace!("Destroy mutex");
            let code = self.rt.domain().mutex_destroy(raw);
            if code != 0 {
                debug!("mutex_destroy returned {}", code);
            }
        }
    }
}

impl<D: Domain> fmt::Debug for RtMutex<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtMutex")
            .field("domain", &self.rt.domain().name())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Proof that the calling thread holds an [`RtMutex`]. Unlocks on drop.
///
/// Not `Send`: the native mutex must be released by the thread that
/// acquired it.
#[must_use = "if unused the mutex is unlocked immediately"]
pub struct RtMutexGuard<'a, D: Domain = DefaultDomain> {
    mutex: &'a RtMutex<D>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, D: Domain> RtMutexGuard<'a, D> {
    fn new(mutex: &'a RtMutex<D>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }

    pub fn mutex(&self) -> &'a RtMutex<D> {
        self.mutex
    }

    /// Release the lock and report whether the native unlock succeeded.
    pub fn unlock(self) -> Result<(), RtError> {
        let mutex = self.mutex;
        std::mem::forget(self);
        mutex.unlock_raw()
    }
}

impl<D: Domain> Drop for RtMutexGuard<'_, D> {
    fn drop(&mut self) {
        if let Err(e) = self.mutex.unlock_raw() {
            warn!("Failed to release mutex: {}", e);
        }
    }
}

impl<D: Domain> fmt::Debug for RtMutexGuard<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtMutexGuard").field("mutex", self.mutex).finish()
    }
}
