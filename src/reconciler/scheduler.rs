// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconcile scheduler.
//!
//! Decides when the next cycle runs and drives cycles one at a time:
//!
//! - After a successful cycle: the resync period plus a uniform jitter in `[0, jitter)`.
//! - After a failed cycle: an exponential backoff from `retry_initial` capped at
//!   `retry_max`, reset by the next success.
//! - A cluster-change trigger starts a cycle early, but never sooner than `trigger_debounce`
//!   after the previous cycle ended. Triggers that arrive while a cycle runs coalesce into
//!   one.
//! - After a failed cycle a trigger does not cut the backoff short; the retry still waits
//!   for the backoff delay.

use super::retry::{failure_backoff, ExponentialBackoff};
use super::Reconciler;
use crate::constants::{
    DEFAULT_RESYNC_JITTER_SECS, DEFAULT_RESYNC_PERIOD_SECS, DEFAULT_RETRY_INITIAL_SECS,
    DEFAULT_RETRY_MAX_SECS, DEFAULT_TRIGGER_DEBOUNCE_SECS,
};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info};

/// Timing configuration of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Base period between successful cycles
    pub resync_period: Duration,
    /// Upper bound (exclusive) of the random delay added to the resync period
    pub resync_jitter: Duration,
    /// First retry interval after a failure
    pub retry_initial: Duration,
    /// Ceiling of the retry interval
    pub retry_max: Duration,
    /// Minimum spacing between the end of a cycle and a triggered one
    pub trigger_debounce: Duration,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            resync_period: Duration::from_secs(DEFAULT_RESYNC_PERIOD_SECS),
            resync_jitter: Duration::from_secs(DEFAULT_RESYNC_JITTER_SECS),
            retry_initial: Duration::from_secs(DEFAULT_RETRY_INITIAL_SECS),
            retry_max: Duration::from_secs(DEFAULT_RETRY_MAX_SECS),
            trigger_debounce: Duration::from_secs(DEFAULT_TRIGGER_DEBOUNCE_SECS),
        }
    }
}

/// Next-run bookkeeping across cycles.
#[derive(Debug, Clone)]
pub struct Schedule {
    settings: ScheduleSettings,
    backoff: ExponentialBackoff,
    consecutive_failures: u32,
}

impl Schedule {
    #[must_use]
    pub fn new(settings: ScheduleSettings) -> Self {
        let backoff = failure_backoff(settings.retry_initial, settings.retry_max);
        Self {
            settings,
            backoff,
            consecutive_failures: 0,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    /// Failed cycles since the last success.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Record a successful cycle and return the delay before the next one.
    pub fn on_success(&mut self) -> Duration {
        self.consecutive_failures = 0;
        self.backoff.reset();
        jittered_resync(self.settings.resync_period, self.settings.resync_jitter)
    }

    /// Record a failed cycle and return the delay before the retry.
    pub fn on_failure(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.backoff
            .next_backoff()
            .unwrap_or(self.settings.retry_max)
    }
}

/// `period` plus a uniformly random delay in `[0, jitter)`.
#[must_use]
pub fn jittered_resync(period: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return period;
    }
    let extra = rand::rng().random_range(0.0..jitter.as_secs_f64());
    period.saturating_add(Duration::from_secs_f64(extra))
}

/// When a cycle that ended at `finished` may be followed by a triggered one.
///
/// The debounce always applies; after a failure the backoff delay `next_run` applies too.
#[must_use]
pub fn triggered_run_at(
    finished: Instant,
    debounce: Duration,
    next_run: Duration,
    failed: bool,
) -> Instant {
    let wait = if failed {
        debounce.max(next_run)
    } else {
        debounce
    };
    finished + wait
}

/// Drive reconciliation cycles until `shutdown` resolves.
///
/// The first cycle runs immediately. A cycle in flight when `shutdown` resolves is dropped;
/// batches it already committed stay committed.
pub async fn run<F>(reconciler: Arc<Reconciler>, trigger: Arc<Notify>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let debounce = reconciler.schedule_settings().trigger_debounce;

    loop {
        let outcome = tokio::select! {
            biased;
            () = &mut shutdown => {
                info!("Shutdown requested, stopping reconciliation loop");
                return;
            }
            outcome = reconciler.reconcile() => outcome,
        };
        let finished = Instant::now();
        let (next_run, failed) = match outcome {
            Ok(next) => (next, false),
            Err(ref error) => (reconciler.error_policy(error), true),
        };
        debug!(next_run = ?next_run, "Next reconciliation scheduled");

        tokio::select! {
            biased;
            () = &mut shutdown => {
                info!("Shutdown requested, stopping reconciliation loop");
                return;
            }
            () = sleep(next_run) => {
                debug!("Scheduled reconciliation is due");
            }
            () = trigger.notified() => {
                let earliest = triggered_run_at(finished, debounce, next_run, failed);
                debug!(
                    delay = ?earliest.saturating_duration_since(Instant::now()),
                    backing_off = failed,
                    "Cluster change observed, reconciling early"
                );
                tokio::select! {
                    biased;
                    () = &mut shutdown => {
                        info!("Shutdown requested, stopping reconciliation loop");
                        return;
                    }
                    () = sleep_until(earliest) => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod scheduler_tests;
