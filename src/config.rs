// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line and environment configuration.
//!
//! Every option can also be set through a `CLUSTERZONE_*` environment variable. Durations
//! are plain seconds (`300`) or a number with a unit (`30s`, `5m`, `1h`).

use crate::constants::{
    DEFAULT_CLOUD_DNS_ENDPOINT, DEFAULT_MAX_CHANGES_PER_BATCH, DEFAULT_METADATA_ENDPOINT,
    DEFAULT_RECORD_PAGE_SIZE, DEFAULT_RECORD_TTL_SECS, DEFAULT_ZONE_NAME, MAX_INTERVAL_SECS,
    MAX_RECORD_PAGE_SIZE, METRICS_SERVER_BIND_ADDRESS,
};
use crate::reconciler::desired::absolute_zone;
use crate::reconciler::scheduler::ScheduleSettings;
use crate::reconciler::ReconcileSettings;
use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3600;

/// Longest DNS label
const MAX_LABEL_LENGTH: usize = 63;

/// Where zone records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Google Cloud DNS
    CloudDns,
    /// Process-local store, for development and dry runs
    Memory,
}

/// clusterzone configuration.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "clusterzone",
    version,
    about = "Keeps a private DNS zone in sync with the pods and services of a Kubernetes cluster"
)]
pub struct Config {
    /// Private zone to manage
    #[arg(long, env = "CLUSTERZONE_ZONE_NAME", default_value = DEFAULT_ZONE_NAME)]
    pub zone_name: String,

    /// TTL of published records, in seconds
    #[arg(long, env = "CLUSTERZONE_RECORD_TTL", default_value_t = DEFAULT_RECORD_TTL_SECS)]
    pub record_ttl: u32,

    /// Period between successful cycles
    #[arg(
        long,
        env = "CLUSTERZONE_RESYNC_PERIOD",
        default_value = "300",
        value_parser = parse_duration
    )]
    pub resync_period: Duration,

    /// Upper bound of the random delay added to the resync period
    #[arg(
        long,
        env = "CLUSTERZONE_RESYNC_JITTER",
        default_value = "120",
        value_parser = parse_duration
    )]
    pub resync_jitter: Duration,

    /// First retry interval after a failed cycle
    #[arg(
        long,
        env = "CLUSTERZONE_RETRY_INITIAL",
        default_value = "30",
        value_parser = parse_duration
    )]
    pub retry_initial: Duration,

    /// Ceiling of the retry interval
    #[arg(
        long,
        env = "CLUSTERZONE_RETRY_MAX",
        default_value = "300",
        value_parser = parse_duration
    )]
    pub retry_max: Duration,

    /// Deadline of a whole cycle
    #[arg(
        long,
        env = "CLUSTERZONE_CYCLE_TIMEOUT",
        default_value = "120",
        value_parser = parse_duration
    )]
    pub cycle_timeout: Duration,

    /// Minimum spacing between a cycle and one triggered by a cluster change
    #[arg(
        long,
        env = "CLUSTERZONE_TRIGGER_DEBOUNCE",
        default_value = "10",
        value_parser = parse_duration
    )]
    pub trigger_debounce: Duration,

    /// Record sets requested per listing page
    #[arg(
        long,
        env = "CLUSTERZONE_PAGE_SIZE",
        default_value_t = DEFAULT_RECORD_PAGE_SIZE,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_RECORD_PAGE_SIZE))
    )]
    pub page_size: u32,

    /// Maximum record set operations per change submission
    #[arg(
        long,
        env = "CLUSTERZONE_MAX_CHANGES_PER_BATCH",
        default_value_t = DEFAULT_MAX_CHANGES_PER_BATCH
    )]
    pub max_changes_per_batch: usize,

    /// DNS backend
    #[arg(long, env = "CLUSTERZONE_BACKEND", value_enum, default_value_t = Backend::CloudDns)]
    pub backend: Backend,

    /// Cloud project owning the zone (default: read from instance metadata)
    #[arg(long, env = "CLUSTERZONE_PROJECT")]
    pub project: Option<String>,

    /// Network the zone is private to, as a full network URL (default: read from instance
    /// metadata)
    #[arg(long, env = "CLUSTERZONE_NETWORK_SCOPE")]
    pub network_scope: Option<String>,

    /// Static bearer token for the DNS API (default: read from instance metadata)
    #[arg(long, env = "CLUSTERZONE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Cloud DNS API endpoint
    #[arg(long, env = "CLUSTERZONE_DNS_ENDPOINT", default_value = DEFAULT_CLOUD_DNS_ENDPOINT)]
    pub dns_endpoint: String,

    /// Instance metadata endpoint
    #[arg(
        long,
        env = "CLUSTERZONE_METADATA_ENDPOINT",
        default_value = DEFAULT_METADATA_ENDPOINT
    )]
    pub metadata_endpoint: String,

    /// Address of the metrics and health server
    #[arg(
        long,
        env = "CLUSTERZONE_METRICS_BIND_ADDRESS",
        default_value = METRICS_SERVER_BIND_ADDRESS
    )]
    pub metrics_bind_address: SocketAddr,

    /// Reconcile early when pods or services change (default)
    #[arg(long, overrides_with = "no_watch")]
    pub watch: bool,

    /// Only reconcile on the resync period
    #[arg(long, env = "CLUSTERZONE_NO_WATCH", overrides_with = "watch")]
    pub no_watch: bool,
}

impl Config {
    /// Whether cluster changes trigger early cycles.
    #[must_use]
    pub fn watch_enabled(&self) -> bool {
        !self.no_watch
    }

    /// Check values clap cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid option.
    pub fn validate(&self) -> Result<()> {
        validate_zone_name(&self.zone_name)?;
        ensure!(self.record_ttl > 0, "--record-ttl must be at least 1 second");
        ensure!(
            !self.resync_period.is_zero(),
            "--resync-period must be greater than zero"
        );
        ensure!(
            !self.retry_initial.is_zero(),
            "--retry-initial must be greater than zero"
        );
        ensure!(
            self.retry_max >= self.retry_initial,
            "--retry-max ({:?}) must not be shorter than --retry-initial ({:?})",
            self.retry_max,
            self.retry_initial
        );
        ensure!(
            !self.cycle_timeout.is_zero(),
            "--cycle-timeout must be greater than zero"
        );
        for (flag, interval) in [
            ("--resync-period", self.resync_period),
            ("--resync-jitter", self.resync_jitter),
            ("--retry-initial", self.retry_initial),
            ("--retry-max", self.retry_max),
            ("--trigger-debounce", self.trigger_debounce),
            ("--cycle-timeout", self.cycle_timeout),
        ] {
            ensure!(
                interval <= Duration::from_secs(MAX_INTERVAL_SECS),
                "{flag} ({interval:?}) must not exceed {MAX_INTERVAL_SECS} seconds"
            );
        }
        // A replacing upsert costs a deletion plus an addition.
        ensure!(
            self.max_changes_per_batch >= 2,
            "--max-changes-per-batch must be at least 2"
        );
        if let Some(project) = &self.project {
            ensure!(!project.trim().is_empty(), "--project must not be empty");
        }
        if let Some(scope) = &self.network_scope {
            ensure!(!scope.trim().is_empty(), "--network-scope must not be empty");
        }
        Ok(())
    }

    /// Reconciler settings derived from this configuration.
    #[must_use]
    pub fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            zone_name: absolute_zone(&self.zone_name),
            record_ttl: self.record_ttl,
            page_size: self.page_size,
            max_changes_per_batch: self.max_changes_per_batch,
            cycle_timeout: self.cycle_timeout,
            schedule: ScheduleSettings {
                resync_period: self.resync_period,
                resync_jitter: self.resync_jitter,
                retry_initial: self.retry_initial,
                retry_max: self.retry_max,
                trigger_debounce: self.trigger_debounce,
            },
        }
    }
}

/// Check that `zone` is a usable DNS name (with or without the trailing dot).
///
/// # Errors
///
/// Returns an error naming the offending label.
pub fn validate_zone_name(zone: &str) -> Result<()> {
    let trimmed = zone.trim().trim_end_matches('.');
    ensure!(!trimmed.is_empty(), "--zone-name must not be empty");

    for label in trimmed.split('.') {
        ensure!(!label.is_empty(), "zone name '{zone}' contains an empty label");
        ensure!(
            label.len() <= MAX_LABEL_LENGTH,
            "label '{label}' of zone name '{zone}' is longer than {MAX_LABEL_LENGTH} characters"
        );
        ensure!(
            label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-'),
            "label '{label}' of zone name '{zone}' contains invalid characters"
        );
        ensure!(
            !label.starts_with('-') && !label.ends_with('-'),
            "label '{label}' of zone name '{zone}' must not start or end with '-'"
        );
    }
    Ok(())
}

/// Parse a duration given as plain seconds or with a unit.
///
/// Supported units:
/// - none or `s` (seconds): "300", "300s"
/// - `m` (minutes): "5m"
/// - `h` (hours): "1h"
///
/// # Examples
///
/// ```
/// use clusterzone::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("300").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
/// assert!(parse_duration("5x").is_err());
/// ```
///
/// # Errors
///
/// Returns an error if the value is empty, not a non-negative integer, has an unknown unit
/// or overflows.
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let duration_str = duration_str.trim();
    if duration_str.is_empty() {
        bail!("Duration string cannot be empty");
    }

    let split_pos = duration_str
        .chars()
        .position(|c| !c.is_ascii_digit())
        .unwrap_or(duration_str.len());
    let (value_str, unit) = duration_str.split_at(split_pos);

    let value: u64 = value_str
        .parse()
        .with_context(|| format!("Duration '{duration_str}' must start with a positive integer"))?;

    let seconds = match unit {
        "" | "s" => value,
        "m" => value
            .checked_mul(SECONDS_PER_MINUTE)
            .context("Duration value too large (overflow)")?,
        "h" => value
            .checked_mul(SECONDS_PER_HOUR)
            .context("Duration value too large (overflow)")?,
        _ => {
            bail!("Unsupported duration unit '{unit}'. Use 's' (seconds), 'm' (minutes), or 'h' (hours)")
        }
    };

    ensure!(
        seconds <= MAX_INTERVAL_SECS,
        "Duration '{duration_str}' is longer than {MAX_INTERVAL_SECS} seconds"
    );
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
