// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zone reconciliation.
//!
//! One cycle walks the states `Bootstrapping → Reading → Diffing → Applying` and ends in
//! `Scheduled`:
//!
//! 1. **Bootstrap** - Resolve (or create) the private zone; cached after the first success
//! 2. **Read** - List cluster pods, services and the zone's managed records concurrently
//! 3. **Diff** - Compare the desired set built from the cluster with the observed set
//! 4. **Apply** - Submit the change list in atomic batches
//!
//! Nothing but the zone handle survives a cycle. A failed or abandoned cycle leaves no state
//! behind; the next one re-reads everything and submits the residual diff.
//!
//! # Example
//!
//! ```rust,no_run
//! use clusterzone::authority::memory::InMemoryAuthority;
//! use clusterzone::metadata::StaticNetworkScope;
//! use clusterzone::reconciler::{ReconcileSettings, Reconciler};
//! use clusterzone::cluster::ClusterObserver;
//! use std::sync::Arc;
//!
//! async fn once(observer: Arc<dyn ClusterObserver>) {
//!     let reconciler = Reconciler::new(
//!         ReconcileSettings::new("cluster-test.local"),
//!         Arc::new(InMemoryAuthority::new()),
//!         observer,
//!         Arc::new(StaticNetworkScope("projects/acme/global/networks/default".into())),
//!     );
//!     let next_run = reconciler.reconcile().await;
//! }
//! ```

pub mod applier;
pub mod bootstrap;
pub mod desired;
pub mod diff;
pub mod pagination;
pub mod reader;
pub mod retry;
pub mod scheduler;

use crate::authority::DnsAuthority;
use crate::cluster::ClusterObserver;
use crate::constants::{
    DEFAULT_CYCLE_TIMEOUT_SECS, DEFAULT_MAX_CHANGES_PER_BATCH, DEFAULT_RECORD_PAGE_SIZE,
    DEFAULT_RECORD_TTL_SECS,
};
use crate::errors::{CycleError, CycleStage, ReadError};
use crate::metadata::NetworkScopeResolver;
use crate::metrics;
use crate::record::ZoneHandle;
use applier::{apply_changes, ApplySummary};
use bootstrap::ZoneBootstrapper;
use chrono::{DateTime, Utc};
use desired::{absolute_zone, build_desired_set};
use scheduler::{Schedule, ScheduleSettings};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Settings of a reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Zone name in trailing-dot form
    pub zone_name: String,
    /// TTL of published records
    pub record_ttl: u32,
    /// Record sets requested per listing page
    pub page_size: u32,
    /// Maximum authority operations per change batch
    pub max_changes_per_batch: usize,
    /// Deadline of a whole cycle
    pub cycle_timeout: Duration,
    /// Next-run timing
    pub schedule: ScheduleSettings,
}

impl ReconcileSettings {
    /// Defaults for `zone_name`, which is normalised to trailing-dot form.
    #[must_use]
    pub fn new(zone_name: &str) -> Self {
        Self {
            zone_name: absolute_zone(zone_name),
            record_ttl: DEFAULT_RECORD_TTL_SECS,
            page_size: DEFAULT_RECORD_PAGE_SIZE,
            max_changes_per_batch: DEFAULT_MAX_CHANGES_PER_BATCH,
            cycle_timeout: Duration::from_secs(DEFAULT_CYCLE_TIMEOUT_SECS),
            schedule: ScheduleSettings::default(),
        }
    }
}

/// Where the reconciler currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// No cycle has run yet
    Idle,
    /// Resolving the network scope and the zone
    Bootstrapping,
    /// Listing cluster membership and the zone's records
    Reading,
    /// Building the desired set and comparing it with the zone
    Diffing,
    /// Submitting change batches
    Applying,
    /// A cycle finished (successfully or not) and the next one is scheduled
    Scheduled,
}

impl ReconcileState {
    /// The cycle stage this state belongs to.
    #[must_use]
    pub fn stage(self) -> CycleStage {
        match self {
            Self::Idle | Self::Scheduled | Self::Bootstrapping => CycleStage::Bootstrapping,
            Self::Reading => CycleStage::Reading,
            Self::Diffing => CycleStage::Diffing,
            Self::Applying => CycleStage::Applying,
        }
    }
}

/// Observable status, published on a watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileStatus {
    pub state: ReconcileState,
    /// End of the last successful cycle
    pub last_success: Option<DateTime<Utc>>,
    /// Message of the last failure, cleared by a success
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

impl ReconcileStatus {
    /// Ready once a cycle has succeeded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.last_success.is_some()
    }
}

impl Default for ReconcileStatus {
    fn default() -> Self {
        Self {
            state: ReconcileState::Idle,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }
}

/// Summary of a successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub zone: ZoneHandle,
    /// Records derived from the cluster
    pub desired: usize,
    /// Managed records the authority held before applying
    pub observed: usize,
    pub applied: ApplySummary,
}

/// Reconciles one private zone against cluster membership.
pub struct Reconciler {
    settings: ReconcileSettings,
    bootstrapper: ZoneBootstrapper,
    authority: Arc<dyn DnsAuthority>,
    observer: Arc<dyn ClusterObserver>,
    schedule: Mutex<Schedule>,
    cycle_lock: tokio::sync::Mutex<()>,
    status: watch::Sender<ReconcileStatus>,
}

impl Reconciler {
    pub fn new(
        settings: ReconcileSettings,
        authority: Arc<dyn DnsAuthority>,
        observer: Arc<dyn ClusterObserver>,
        scope: Arc<dyn NetworkScopeResolver>,
    ) -> Self {
        let bootstrapper =
            ZoneBootstrapper::new(settings.zone_name.clone(), authority.clone(), scope);
        let schedule = Mutex::new(Schedule::new(settings.schedule.clone()));
        let (status, _) = watch::channel(ReconcileStatus::default());
        Self {
            settings,
            bootstrapper,
            authority,
            observer,
            schedule,
            cycle_lock: tokio::sync::Mutex::new(()),
            status,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    #[must_use]
    pub fn schedule_settings(&self) -> &ScheduleSettings {
        &self.settings.schedule
    }

    /// The zone handle, once bootstrapped.
    #[must_use]
    pub fn zone(&self) -> Option<&ZoneHandle> {
        self.bootstrapper.cached()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ReconcileStatus {
        self.status.borrow().clone()
    }

    /// Receive status updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ReconcileStatus> {
        self.status.subscribe()
    }

    /// Run one cycle and return the delay before the next one.
    ///
    /// Concurrent callers are serialised: a call made while a cycle is running waits for it
    /// to finish and then runs its own.
    ///
    /// # Errors
    ///
    /// Returns the [`CycleError`] of the failed stage, or [`CycleError::Timeout`] if the
    /// cycle exceeded its deadline. Pass it to [`Reconciler::error_policy`] to learn when to
    /// retry.
    pub async fn reconcile(&self) -> Result<Duration, CycleError> {
        let _cycle = self.cycle_lock.lock().await;
        let started = Instant::now();

        let result =
            match tokio::time::timeout(self.settings.cycle_timeout, self.run_cycle()).await {
                Ok(result) => result,
                Err(_) => Err(CycleError::Timeout {
                    zone: self.settings.zone_name.clone(),
                    stage: self.status.borrow().state.stage(),
                    after: self.settings.cycle_timeout,
                }),
            };
        let elapsed = started.elapsed();

        match result {
            Ok(report) => {
                let next_run = self.lock_schedule().on_success();
                metrics::record_cycle("success", elapsed);
                metrics::set_consecutive_failures(0);
                self.status.send_modify(|status| {
                    status.state = ReconcileState::Scheduled;
                    status.last_success = Some(Utc::now());
                    status.last_error = None;
                    status.consecutive_failures = 0;
                });
                info!(
                    zone = %report.zone,
                    desired = report.desired,
                    observed = report.observed,
                    changed = report.applied.changed(),
                    upserted = report.applied.upserted,
                    deleted = report.applied.deleted,
                    batches = report.applied.batches,
                    duration_ms = elapsed.as_millis(),
                    next_run_in = ?next_run,
                    "Reconciliation cycle complete"
                );
                Ok(next_run)
            }
            Err(err) => {
                let outcome = if matches!(err, CycleError::Timeout { .. }) {
                    "timeout"
                } else {
                    "error"
                };
                metrics::record_cycle(outcome, elapsed);
                metrics::record_cycle_error(err.stage().as_str());
                self.status.send_modify(|status| {
                    status.state = ReconcileState::Scheduled;
                    status.last_error = Some(err.to_string());
                });
                error!(
                    zone = %self.settings.zone_name,
                    stage = %err.stage(),
                    duration_ms = elapsed.as_millis(),
                    "Reconciliation cycle failed: {err}"
                );
                Err(err)
            }
        }
    }

    /// Delay before retrying after `error`.
    ///
    /// Grows exponentially with the number of consecutive failures, up to the configured
    /// ceiling. A successful [`Reconciler::reconcile`] resets it.
    pub fn error_policy(&self, error: &CycleError) -> Duration {
        let (retry_in, failures) = {
            let mut schedule = self.lock_schedule();
            let retry_in = schedule.on_failure();
            (retry_in, schedule.consecutive_failures())
        };
        metrics::set_consecutive_failures(failures);
        self.status
            .send_modify(|status| status.consecutive_failures = failures);
        warn!(
            zone = %self.settings.zone_name,
            stage = %error.stage(),
            consecutive_failures = failures,
            retry_in = ?retry_in,
            "Retrying reconciliation after failure"
        );
        retry_in
    }

    async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        self.set_state(ReconcileState::Bootstrapping);
        let zone = self.bootstrapper.ensure_zone().await?;

        self.set_state(ReconcileState::Reading);
        let cluster_error = |source| ReadError::Cluster {
            zone: zone.name.clone(),
            source,
        };
        let (pods, services, observed) = tokio::try_join!(
            async { self.observer.list_pods().await.map_err(cluster_error) },
            async { self.observer.list_services().await.map_err(cluster_error) },
            reader::list_managed_records(self.authority.as_ref(), &zone, self.settings.page_size),
        )?;
        let desired = build_desired_set(&zone.name, self.settings.record_ttl, &pods, &services);
        metrics::set_record_counts(desired.len(), observed.len());
        debug!(
            zone = %zone,
            pods = pods.len(),
            services = services.len(),
            desired = desired.len(),
            observed = observed.len(),
            "Read cluster and zone state"
        );

        self.set_state(ReconcileState::Diffing);
        let changes = diff::diff(&desired, &observed)?;
        debug!(zone = %zone, changes = changes.len(), "Computed change list");

        self.set_state(ReconcileState::Applying);
        let applied = apply_changes(
            self.authority.as_ref(),
            &zone,
            &changes,
            self.settings.max_changes_per_batch,
        )
        .await
        .inspect_err(|err| {
            let (upserted, deleted) = err.committed();
            metrics::record_records_changed("upsert", upserted);
            metrics::record_records_changed("delete", deleted);
        })?;
        metrics::record_records_changed("upsert", applied.upserted);
        metrics::record_records_changed("delete", applied.deleted);

        Ok(CycleReport {
            desired: desired.len(),
            observed: observed.len(),
            applied,
            zone,
        })
    }

    fn set_state(&self, state: ReconcileState) {
        self.status.send_modify(|status| status.state = state);
    }

    fn lock_schedule(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
