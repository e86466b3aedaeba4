// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the clusterzone controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Zone Constants
// ============================================================================

/// Default name of the private zone mirrored from the cluster (trailing-dot form)
pub const DEFAULT_ZONE_NAME: &str = "cluster-test.local.";

/// Label inserted between a pod address and its namespace (`<ip>.<ns>.pod.<zone>`)
pub const POD_SUBDOMAIN: &str = "pod";

/// Label inserted between a service name and its namespace (`<svc>.<ns>.svc.<zone>`)
pub const SERVICE_SUBDOMAIN: &str = "svc";

/// Default TTL for published records (1 minute, pods churn quickly)
pub const DEFAULT_RECORD_TTL_SECS: u32 = 60;

/// Prefix of the creation token sent with zone create calls
pub const CREATION_TOKEN_PREFIX: &str = "clusterzone";

/// Description attached to zones created by the controller
pub const ZONE_DESCRIPTION: &str = "Private zone managed by clusterzone";

// ============================================================================
// Scheduling Constants
// ============================================================================

/// Base period between successful reconciliation cycles (5 minutes)
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 300;

/// Upper bound of the random jitter added to the resync period (2 minutes)
pub const DEFAULT_RESYNC_JITTER_SECS: u64 = 120;

/// First retry interval after a failed cycle (30 seconds)
pub const DEFAULT_RETRY_INITIAL_SECS: u64 = 30;

/// Ceiling for the retry interval after repeated failures (5 minutes)
pub const DEFAULT_RETRY_MAX_SECS: u64 = 300;

/// Deadline for a whole reconciliation cycle (2 minutes)
pub const DEFAULT_CYCLE_TIMEOUT_SECS: u64 = 120;

/// Minimum spacing between a finished cycle and an event-triggered one (10 seconds)
pub const DEFAULT_TRIGGER_DEBOUNCE_SECS: u64 = 10;

/// Longest accepted value for any configured interval (7 days)
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 3600;

/// Growth factor of the failure retry interval
pub const RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization applied to failure retry intervals (±10%)
pub const RETRY_RANDOMIZATION_FACTOR: f64 = 0.1;

// ============================================================================
// DNS Authority Constants
// ============================================================================

/// Default number of record sets requested per listing page
pub const DEFAULT_RECORD_PAGE_SIZE: u32 = 100;

/// Largest page size accepted by the authority
pub const MAX_RECORD_PAGE_SIZE: u32 = 1000;

/// Maximum number of record set operations in one change submission
pub const DEFAULT_MAX_CHANGES_PER_BATCH: usize = 1000;

/// Default Cloud DNS API endpoint
pub const DEFAULT_CLOUD_DNS_ENDPOINT: &str = "https://dns.googleapis.com/dns/v1";

/// Default compute metadata server endpoint
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://metadata.google.internal/computeMetadata/v1";

/// Network scope used by the in-memory backend when none is configured
pub const LOCAL_NETWORK_SCOPE: &str = "local";

/// Header required by the metadata server
pub const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";

/// Value of the metadata flavor header
pub const METADATA_FLAVOR_VALUE: &str = "Google";

/// Prefix used to build network scope ids from project and network names
pub const COMPUTE_API_PREFIX: &str = "https://www.googleapis.com/compute/v1";

/// Access tokens are refreshed this long before they expire
pub const ACCESS_TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

/// Timeout applied to every HTTP request
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Kubernetes Constants
// ============================================================================

/// Page size for paginated Kubernetes list calls
pub const KUBE_LIST_PAGE_SIZE: u32 = 100;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Default bind address for the metrics and health HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Path for the liveness endpoint
pub const HEALTHZ_PATH: &str = "/healthz";

/// Path for the readiness endpoint
pub const READYZ_PATH: &str = "/readyz";
