// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Backoff schedules and retry of single API calls.
//!
//! | Schedule            | Used for                          | First | Ceiling | Gives up after |
//! |---------------------|-----------------------------------|-------|---------|----------------|
//! | [`kube_backoff`]    | Kubernetes list calls             | 100ms | 30s     | 5 minutes      |
//! | [`http_backoff`]    | Cloud DNS and metadata requests   | 50ms  | 10s     | 2 minutes      |
//! | [`failure_backoff`] | Spacing between failed cycles     | set   | set     | never          |
//!
//! Every schedule doubles and applies ±10% jitter.

use crate::constants::{RETRY_BACKOFF_MULTIPLIER, RETRY_RANDOMIZATION_FACTOR};
use anyhow::{anyhow, Result};
use rand::Rng;
use reqwest::StatusCode;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Limits of a bounded retry schedule.
#[derive(Debug, Clone, Copy)]
struct Profile {
    first: Duration,
    ceiling: Duration,
    give_up_after: Duration,
}

const KUBE_PROFILE: Profile = Profile {
    first: Duration::from_millis(100),
    ceiling: Duration::from_secs(30),
    give_up_after: Duration::from_secs(300),
};

const HTTP_PROFILE: Profile = Profile {
    first: Duration::from_millis(50),
    ceiling: Duration::from_secs(10),
    give_up_after: Duration::from_secs(120),
};

/// Doubling delay with jitter, optionally bounded in total time.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Base of the next delay, before jitter
    pub current_interval: Duration,
    /// Restored by [`ExponentialBackoff::reset`]
    pub initial_interval: Duration,
    /// The base delay never grows past this
    pub max_interval: Duration,
    /// `None` keeps producing delays forever
    pub max_elapsed_time: Option<Duration>,
    pub multiplier: f64,
    /// Each delay is drawn from `base * (1 ± factor)`
    pub randomization_factor: f64,
    started: Instant,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            max_elapsed_time,
            multiplier,
            randomization_factor,
            started: Instant::now(),
        }
    }

    fn bounded(profile: Profile) -> Self {
        Self::new(
            profile.first,
            profile.ceiling,
            Some(profile.give_up_after),
            RETRY_BACKOFF_MULTIPLIER,
            RETRY_RANDOMIZATION_FACTOR,
        )
    }

    /// The next delay, or `None` once the elapsed-time budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self
            .max_elapsed_time
            .is_some_and(|budget| self.started.elapsed() >= budget)
        {
            return None;
        }

        let base = self.current_interval;
        self.current_interval = base.mul_f64(self.multiplier).min(self.max_interval);
        Some(jitter(base, self.randomization_factor))
    }

    /// Go back to the first delay and restart the elapsed-time budget.
    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.started = Instant::now();
    }
}

fn jitter(base: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || base.is_zero() {
        return base;
    }
    let secs = base.as_secs_f64();
    let spread = secs * factor;
    let drawn = rand::rng().random_range((secs - spread)..=(secs + spread));
    Duration::from_secs_f64(drawn.max(0.0))
}

/// Schedule for retrying Kubernetes API calls.
#[must_use]
pub fn kube_backoff() -> ExponentialBackoff {
    ExponentialBackoff::bounded(KUBE_PROFILE)
}

/// Schedule for retrying requests to the DNS authority and the metadata server.
///
/// Delays run roughly 50ms, 100ms, 200ms ... 6.4s, then stay at 10s until two minutes have
/// passed.
#[must_use]
pub fn http_backoff() -> ExponentialBackoff {
    ExponentialBackoff::bounded(HTTP_PROFILE)
}

/// Schedule for spacing failed reconciliation cycles.
///
/// Never runs out. A `max` below `initial` is raised to `initial`.
#[must_use]
pub fn failure_backoff(initial: Duration, max: Duration) -> ExponentialBackoff {
    ExponentialBackoff::new(
        initial,
        max.max(initial),
        None,
        RETRY_BACKOFF_MULTIPLIER,
        RETRY_RANDOMIZATION_FACTOR,
    )
}

/// Rate limiting and the 5xx codes a load balancer or overloaded backend returns.
#[must_use]
pub fn is_retryable_http_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || matches!(
            status,
            StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        )
}

/// Kubernetes failures worth repeating: 429, any 5xx, and errors below the HTTP layer.
fn is_transient_kube_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(response) => response.code == 429 || (500..600).contains(&response.code),
        kube::Error::Service(_) => true,
        _ => false,
    }
}

/// Run a Kubernetes API call, repeating it on transient failures per [`kube_backoff`].
///
/// # Errors
///
/// Returns the first permanent error, or the last transient one once the schedule runs out.
pub async fn retry_kube_call<T, F, Fut>(mut call: F, what: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = kube_backoff();
    let started = Instant::now();
    let mut attempt = 0_u32;

    loop {
        attempt += 1;
        let err = match call().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        call = what,
                        attempt,
                        elapsed = ?started.elapsed(),
                        "Kubernetes call recovered"
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_transient_kube_error(&err) {
            error!(call = what, error = %err, "Kubernetes call failed permanently");
            return Err(err.into());
        }
        let Some(delay) = backoff.next_backoff() else {
            error!(
                call = what,
                attempt,
                elapsed = ?started.elapsed(),
                error = %err,
                "Giving up on Kubernetes call"
            );
            return Err(anyhow!("{what} failed after {attempt} attempts: {err}"));
        };
        warn!(
            call = what,
            attempt,
            retry_in = ?delay,
            error = %err,
            "Kubernetes call failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
