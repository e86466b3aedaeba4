// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the reconciliation engine and its collaborators.
//!
//! This module provides specialized error types for:
//! - DNS authority API operations (zone lookup/creation, record listing, change submission)
//! - Network-scope lookups against the instance metadata server
//! - Cluster membership listing through the Kubernetes API
//! - Each stage of a reconciliation cycle (bootstrap, read, diff, apply)
//!
//! Every stage error carries the zone name and the wrapped cause so a failed cycle can be
//! diagnosed from a single log line.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by a DNS authority implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    /// The addressed zone or record set does not exist (HTTP 404)
    #[error("{what} not found on the DNS authority")]
    NotFound {
        /// Description of the missing object
        what: String,
    },

    /// Creation conflicted with an existing object (HTTP 409)
    ///
    /// For zone creation this usually means another controller instance created the
    /// zone first; the bootstrapper re-runs its lookup and adopts it.
    #[error("{what} already exists on the DNS authority")]
    AlreadyExists {
        /// Description of the conflicting object
        what: String,
    },

    /// The authority refused the request (4xx other than 404/409/429)
    ///
    /// Includes failed delete preconditions, where the record set to remove no longer
    /// matches what the authority holds.
    #[error("request rejected by the DNS authority (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Error message returned by the authority
        message: String,
    },

    /// Transient failure: rate limiting (429) or a server-side error (5xx)
    #[error("DNS authority unavailable (HTTP {status}): {message}")]
    Unavailable {
        /// HTTP status code
        status: u16,
        /// Error message returned by the authority
        message: String,
    },

    /// The request never produced an HTTP response (connection refused, timeout, ...)
    #[error("transport error talking to the DNS authority: {0}")]
    Transport(String),

    /// The response could not be decoded
    #[error("malformed response from the DNS authority: {0}")]
    Decode(String),

    /// Credentials for the authority could not be obtained
    #[error("failed to obtain DNS authority credentials: {0}")]
    Credentials(String),
}

impl AuthorityError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Transport(_))
    }
}

/// Errors returned when resolving the network scope from instance metadata.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// The metadata server could not be reached or answered with an error status
    #[error("metadata lookup of '{path}' failed: {reason}")]
    Unavailable {
        /// Metadata path that was requested
        path: String,
        /// Why the lookup failed
        reason: String,
    },

    /// The metadata server answered with an empty or unusable value
    #[error("metadata value at '{path}' is malformed: '{value}'")]
    Malformed {
        /// Metadata path that was requested
        path: String,
        /// The value that was returned
        value: String,
    },
}

/// Errors returned by a cluster observer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// Listing a resource type failed
    #[error("unable to list {resource}: {reason}")]
    ListFailed {
        /// The resource type being listed (e.g., `pods`)
        resource: String,
        /// Why the list call failed
        reason: String,
    },
}

/// Zone bootstrap failures. Fatal for the current cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    /// The network scope the zone must be bound to could not be determined
    #[error("unable to determine the network scope for zone '{zone}': {source}")]
    NetworkScope {
        /// Zone being provisioned
        zone: String,
        /// Underlying metadata failure
        #[source]
        source: MetadataError,
    },

    /// Looking the zone up by name failed
    #[error("unable to look up zone '{zone}': {source}")]
    Lookup {
        /// Zone being provisioned
        zone: String,
        /// Underlying authority failure
        #[source]
        source: AuthorityError,
    },

    /// Creating the private zone failed
    #[error("unable to create private zone '{zone}': {source}")]
    Create {
        /// Zone being provisioned
        zone: String,
        /// Underlying authority failure
        #[source]
        source: AuthorityError,
    },

    /// The authority reported the zone as existing but a second lookup did not find it
    #[error("zone '{zone}' reported as existing but no matching private zone bound to {scope} was found")]
    Vanished {
        /// Zone being provisioned
        zone: String,
        /// Network scope the zone must be bound to
        scope: String,
    },
}

/// Failures while reading desired or observed state. Fatal for the current cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// Listing cluster membership failed
    #[error("unable to read cluster membership for zone '{zone}': {source}")]
    Cluster {
        /// Zone being reconciled
        zone: String,
        /// Underlying observer failure
        #[source]
        source: ObserverError,
    },

    /// Listing the records held by the authority failed
    #[error("unable to list records of zone '{zone}' (page {page}): {source}")]
    Authority {
        /// Zone being reconciled
        zone: String,
        /// 1-based number of the page that failed
        page: usize,
        /// Underlying authority failure
        #[source]
        source: AuthorityError,
    },
}

/// Invariant violations detected while diffing.
///
/// The diff is pure computation over already-built sets; these errors indicate a bug in
/// whatever built the desired set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    /// A desired record is stored under a key different from its name
    #[error("desired record '{name}' is stored under key '{key}'")]
    KeyMismatch {
        /// Map key
        key: String,
        /// Record name
        name: String,
    },

    /// A desired record has no values and cannot be published
    #[error("desired record '{name}' has no values")]
    EmptyRecord {
        /// Record name
        name: String,
    },
}

/// Change submission failures. Fatal for the current cycle; the next cycle re-reads the
/// zone and submits whatever residual diff remains.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// The first batch failed; nothing was committed
    #[error("no changes applied to zone '{zone}' ({total_batches} batch(es) planned): {source}")]
    Rejected {
        /// Zone being reconciled
        zone: String,
        /// Number of batches that were planned
        total_batches: usize,
        /// Underlying authority failure
        #[source]
        source: AuthorityError,
    },

    /// Some batches were committed before a later one failed
    #[error(
        "partially applied changes to zone '{zone}': {committed_batches}/{total_batches} batch(es) committed ({upserted} upserted, {deleted} deleted): {source}"
    )]
    Partial {
        /// Zone being reconciled
        zone: String,
        /// Number of batches committed before the failure
        committed_batches: usize,
        /// Number of batches that were planned
        total_batches: usize,
        /// Upserts committed before the failure
        upserted: usize,
        /// Deletes committed before the failure
        deleted: usize,
        /// Underlying authority failure
        #[source]
        source: AuthorityError,
    },
}

impl ApplyError {
    /// Upserts and deletes committed before the failure.
    #[must_use]
    pub fn committed(&self) -> (usize, usize) {
        match self {
            Self::Rejected { .. } => (0, 0),
            Self::Partial {
                upserted, deleted, ..
            } => (*upserted, *deleted),
        }
    }

    /// Records changed before the failure.
    #[must_use]
    pub fn changed(&self) -> usize {
        let (upserted, deleted) = self.committed();
        upserted + deleted
    }
}

/// Stages of a reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleStage {
    /// Resolving or creating the zone
    Bootstrapping,
    /// Listing cluster membership and authority records
    Reading,
    /// Computing the change list
    Diffing,
    /// Submitting change batches
    Applying,
}

impl CycleStage {
    /// Lowercase label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrapping => "bootstrapping",
            Self::Reading => "reading",
            Self::Diffing => "diffing",
            Self::Applying => "applying",
        }
    }
}

impl std::fmt::Display for CycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one reconciliation cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    /// Zone bootstrap failed
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// Reading desired or observed state failed
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The diff detected an invariant violation
    #[error(transparent)]
    Diff(#[from] DiffError),

    /// Submitting changes failed
    #[error(transparent)]
    Apply(#[from] ApplyError),

    /// The cycle exceeded its deadline and was abandoned
    #[error("reconciliation cycle for zone '{zone}' abandoned after {after:?} while {stage}")]
    Timeout {
        /// Zone being reconciled
        zone: String,
        /// Stage that was running when the deadline passed
        stage: CycleStage,
        /// Configured deadline
        after: Duration,
    },
}

impl CycleError {
    /// The stage that failed.
    #[must_use]
    pub fn stage(&self) -> CycleStage {
        match self {
            Self::Provisioning(_) => CycleStage::Bootstrapping,
            Self::Read(_) => CycleStage::Reading,
            Self::Diff(_) => CycleStage::Diffing,
            Self::Apply(_) => CycleStage::Applying,
            Self::Timeout { stage, .. } => *stage,
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
