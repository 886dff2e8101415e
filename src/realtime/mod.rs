// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Self-healing synchronization for real-time scheduling domains.
//!
//! A real-time co-kernel only lets threads it schedules touch its mutexes
//! and condition variables. Application threads are usually created
//! elsewhere, so the primitives here detect the "thread not registered"
//! failure, register the caller on demand and replay the call once.
//!
//! # Recovery protocol
//!
//! - A native call returns the domain-mismatch code.
//! - The caller is migrated into the domain; if that fails the runtime is
//!   bootstrapped and migration is tried one more time.
//! - The original call is replayed exactly once.
//!
//! Anything else, or a second failure, is reported to the caller.

mod bootstrap;
mod condvar;
mod migrate;
mod mutex;
mod retry;
mod stats;

pub use bootstrap::Bootstrapper;
pub use condvar::RtCondvar;
pub use mutex::{RtMutex, RtMutexGuard};
pub use stats::{Counter, RtStats, RtStatsSnapshot};

use crate::config::RtConfig;
use crate::domain::{DefaultDomain, Domain};
use crate::error::RtError;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Global context for the default domain.
static GLOBAL: OnceLock<Arc<Realtime<DefaultDomain>>> = OnceLock::new();

/// A real-time domain together with its configuration and counters.
///
/// Guarded primitives hold an `Arc` to the context they were created in.
pub struct Realtime<D: Domain> {
    domain: D,
    config: RtConfig,
    stats: RtStats,
}

impl<D: Domain> Realtime<D> {
    /// Create a context. Bootstraps immediately if `config.bootstrap.eager`.
    pub fn new(domain: D, config: RtConfig) -> Arc<Self> {
        let runtime = Arc::new(Self {
            domain,
            config,
            stats: RtStats::default(),
        });
        if runtime.config.bootstrap.eager {
            runtime.bootstrap();
        }
        runtime
    }

    /// Create a context with default configuration.
    pub fn with_domain(domain: D) -> Arc<Self> {
        Self::new(domain, RtConfig::default())
    }

    pub fn domain(&self) -> &D {
        &self.domain
    }

    pub fn config(&self) -> &RtConfig {
        &self.config
    }

    pub fn stats(&self) -> &RtStats {
        &self.stats
    }

    /// Bootstrap the domain's runtime if nobody has yet.
    ///
    /// Safe to call from any thread, any number of times. Returns true if
    /// this call performed the bootstrap.
    pub fn bootstrap(&self) -> bool {
        let ran = self.domain.bootstrapper().initialize(|| {
            info!("Bootstrapping {} real-time runtime", self.domain.name());
            self.domain.bootstrap(&self.config.bootstrap);
        });
        if ran {
            self.stats.bootstraps.increment();
        }
        ran
    }

    /// Register the calling thread in this domain.
    pub fn migrate_current_thread(&self) -> Result<(), RtError> {
        migrate::migrate_current_thread(self)
    }
}

impl Realtime<DefaultDomain> {
    /// Process-wide context used by `RtMutex::new` and `RtCondvar::new`.
    ///
    /// Configuration is read once, from [`RtConfig::load`].
    pub fn global() -> Arc<Self> {
        let runtime = GLOBAL.get_or_init(|| {
            let config = RtConfig::load().unwrap_or_else(|e| {
                warn!("Failed to load rtlock config, using defaults: {}", e);
                RtConfig::default()
            });
            Self::new(DefaultDomain::default(), config)
        });
        Arc::clone(runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootstrapConfig;
    use crate::domain::{Primitive, SimDomain};

    #[test]
    fn test_lazy_bootstrap_by_default() {
        let sim = SimDomain::new();
        let rt = Realtime::with_domain(sim.clone());
        assert!(!sim.is_bootstrapped());

        assert!(rt.bootstrap());
        assert!(!rt.bootstrap());
        assert_eq!(sim.calls(Primitive::Bootstrap), 1);
        assert_eq!(rt.stats().snapshot().bootstraps, 1);
    }

    #[test]
    fn test_eager_bootstrap_passes_arguments() {
        let sim = SimDomain::new();
        let config = RtConfig {
            bootstrap: BootstrapConfig {
                eager: true,
                trace: true,
                ..BootstrapConfig::default()
            },
        };
        let _rt = Realtime::new(sim.clone(), config);
        assert!(sim.is_bootstrapped());
        assert_eq!(
            sim.bootstrap_argv(),
            Some(vec!["rtlock".to_string(), "--trace".to_string()])
        );
    }

    #[test]
    fn test_contexts_share_domain_bootstrap() {
        let sim = SimDomain::new();
        let first = Realtime::with_domain(sim.clone());
        let second = Realtime::with_domain(sim.clone());

        assert!(first.bootstrap());
        assert!(!second.bootstrap());
        assert_eq!(sim.calls(Primitive::Bootstrap), 1);
    }
}
