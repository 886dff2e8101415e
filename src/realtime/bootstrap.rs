// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! One-shot guard around the process-wide runtime bootstrap.
//!
//! Failure paths on unrelated threads may all decide the runtime needs
//! bootstrapping at the same moment. Exactly one of them runs the bootstrap;
//! the others block until it has finished and then return, so every caller
//! observes a bootstrapped runtime on return.

use parking_lot::{const_mutex, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

/// Idempotent initializer shared by every caller of a domain's bootstrap.
pub struct Bootstrapper {
    done: AtomicBool,
    running: Mutex<()>,
}

impl Bootstrapper {
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            running: const_mutex(()),
        }
    }

    /// Run `init` unless it already ran. Returns true if this call ran it.
    pub fn initialize(&self, init: impl FnOnce()) -> bool {
        if self.done.load(Ordering::Acquire) {
            return false;
        }
        let _running = self.running.lock();
        if self.done.load(Ordering::Acquire) {
            return false;
        }
        init();
        self.done.store(true, Ordering::Release);
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl Default for Bootstrapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_runs_once() {
        let boot = Bootstrapper::new();
        let mut runs = 0;
        assert!(boot.initialize(|| runs += 1));
        assert!(!boot.initialize(|| runs += 1));
        assert_eq!(runs, 1);
        assert!(boot.is_initialized());
    }

    #[test]
    fn test_concurrent_callers_run_once() {
        let boot = Arc::new(Bootstrapper::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let boot = Arc::clone(&boot);
                let runs = Arc::clone(&runs);
                thread::spawn(move || {
                    boot.initialize(|| {
                        runs.fetch_add(1, Ordering::SeqCst);
                    });
                    // Every caller returns only after initialization finished.
                    assert!(boot.is_initialized());
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
