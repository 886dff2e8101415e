// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! rtlock - self-healing mutexes and condition variables for real-time
//! scheduling domains on Linux.
//!
//! Threads created outside a real-time co-kernel (Xenomai/Cobalt) are not
//! allowed to use its primitives until they are registered with its
//! scheduler. [`RtMutex`] and [`RtCondvar`] detect that failure, register
//! the calling thread (bootstrapping the runtime if needed) and retry the
//! call exactly once.
//!
//! Build with the `cobalt` feature to link against `libcobalt`; without it
//! the default domain is plain pthreads.

pub mod config;
pub mod domain;
pub mod error;
pub mod realtime;

pub use config::{BootstrapConfig, ConfigError, RtConfig};
pub use domain::{DefaultDomain, Domain, Outcome, Primitive};
pub use error::RtError;
pub use realtime::{Realtime, RtCondvar, RtMutex, RtMutexGuard, RtStatsSnapshot};
