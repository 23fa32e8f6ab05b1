// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reconnect backoff for the event stream.
//
// The stream always reconnects unless it was closed.  Failed connect attempts
// are spaced out exponentially with jitter so two dashboards restarting at
// the same time do not hammer a controller in lockstep.

use std::time::Duration;

use octodash_core::config::StreamTimings;
use rand::Rng;
use tracing::debug;

/// Reconnect delay configuration.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_timings(&StreamTimings::default())
    }
}

impl ReconnectPolicy {
    pub fn from_timings(timings: &StreamTimings) -> Self {
        Self {
            base_delay: timings.reconnect_base_delay(),
            max_delay: timings.reconnect_max_delay(),
        }
    }

    /// Delay before connect attempt number `failures` (0 = no prior failure).
    ///
    /// delay = min(base * 2^(failures-1) + jitter, max_delay)
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << (failures - 1).min(10));
        let total_ms = exp_ms.saturating_add(jitter(base_ms));
        let capped_ms = total_ms.min(self.max_delay.as_millis() as u64);

        debug!(failures, delay_ms = capped_ms, "reconnect delay");
        Duration::from_millis(capped_ms)
    }
}

/// Random jitter in [0, base).
fn jitter(base_ms: u64) -> u64 {
    rand::rng().random_range(0..base_ms.max(1))
}
