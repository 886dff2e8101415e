// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Registering the calling thread in a real-time domain.

use super::retry::Attempt;
use super::Realtime;
use crate::domain::{Domain, SchedParams};
use crate::error::{strerror, RtError};
use tracing::{debug, warn};

/// Re-apply the caller's current scheduling policy through the domain's
/// scheduler, which makes the domain adopt the thread.
///
/// A failed registration may just mean the runtime was never bootstrapped,
/// so it is bootstrapped and registration is tried once more.
pub(crate) fn migrate_current_thread<D: Domain>(rt: &Realtime<D>) -> Result<(), RtError> {
    let domain = rt.domain();
    rt.stats().migrations.increment();

    let tid = domain.current_tid();
    let params = domain.sched_params().unwrap_or_else(|code| {
        debug!(
            "Could not read scheduling params of thread {}: {}; using defaults",
            tid,
            strerror(&code)
        );
        SchedParams::default()
    });

    let mut attempt = Attempt::First;
    loop {
        let code = domain.set_scheduler(tid, &params);
        if code == 0 {
            debug!(
                "Turned thread {} into a {} thread{}",
                tid,
                domain.name(),
                if attempt.is_retry() { " after bootstrap" } else { "" }
            );
            return Ok(());
        }

        warn!(
            "Unable to turn thread {} into a {} thread: {}",
            tid,
            domain.name(),
            strerror(&code)
        );
        attempt = match attempt.next() {
            Some(next) => next,
            None => {
                rt.stats().migration_failures.increment();
                return Err(RtError::Migration { tid, code });
            }
        };
        rt.bootstrap();
    }
}
