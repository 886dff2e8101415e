// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lock-free counters for the self-healing paths.
//!
//! Updated from whatever thread hits a failure, read from anywhere.
//!
//! ```ignore
//! let snapshot = runtime.stats().snapshot();
//! if snapshot.migration_failures > 0 {
//!     warn!("{} threads could not join the real-time domain", snapshot.migration_failures);
//! }
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic event counter.
///
/// Uses `Relaxed` ordering: counts are diagnostics and never used to
/// synchronize other data.
#[derive(Debug, Default)]
pub struct Counter {
    inner: AtomicU64,
}

impl Counter {
    #[inline]
    pub const fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }

    /// Increment and return the new value.
    #[inline]
    pub fn increment(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }
}

/// Counters kept per [`super::Realtime`] context.
#[derive(Debug, Default)]
pub struct RtStats {
    /// Bootstraps actually run through this context.
    pub bootstraps: Counter,
    /// Calls into the thread migrator.
    pub migrations: Counter,
    /// Migrations that failed even after bootstrapping.
    pub migration_failures: Counter,
    /// Operations replayed after a successful migration.
    pub retries: Counter,
    /// Primitives that ended up disabled at construction.
    pub disabled: Counter,
}

/// Point-in-time copy of [`RtStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RtStatsSnapshot {
    pub bootstraps: u64,
    pub migrations: u64,
    pub migration_failures: u64,
    pub retries: u64,
    pub disabled: u64,
}

impl RtStats {
    pub fn snapshot(&self) -> RtStatsSnapshot {
        RtStatsSnapshot {
            bootstraps: self.bootstraps.get(),
            migrations: self.migrations.get(),
            migration_failures: self.migration_failures.get(),
            retries: self.retries.get(),
            disabled: self.disabled.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);
        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_snapshot() {
        let stats = RtStats::default();
        stats.migrations.increment();
        stats.retries.increment();
        stats.retries.increment();

        let snap = stats.snapshot();
        assert_eq!(snap.migrations, 1);
        assert_eq!(snap.retries, 2);
        assert_eq!(snap.bootstraps, 0);
    }
}
