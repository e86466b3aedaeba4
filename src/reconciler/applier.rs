// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Change applier.
//!
//! Groups a change list by action class (all upserts, then all deletes) and submits each
//! class as one atomic batch. When a class exceeds the authority's per-change limit it is
//! split into consecutive batches, each within the limit. Batches go out one at a time, in
//! order; the first failure stops the run.
//!
//! Deletions are built from the delete-tagged changes only. Upserts carry the record they
//! replace so the authority can swap it in the same commit.

use crate::authority::{ChangeBatch, DnsAuthority};
use crate::errors::ApplyError;
use crate::record::{ChangeAction, ChangeItem, ZoneHandle};
use tracing::{debug, info};

/// Outcome of a successful apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Records created or replaced
    pub upserted: usize,
    /// Records removed
    pub deleted: usize,
    /// Batches submitted
    pub batches: usize,
}

impl ApplySummary {
    /// Total records changed.
    #[must_use]
    pub fn changed(&self) -> usize {
        self.upserted + self.deleted
    }
}

/// Split `changes` into batches of at most `max_weight` authority operations.
///
/// Upserts and deletes never share a batch. A single change heavier than `max_weight` gets
/// a batch of its own.
#[must_use]
pub fn plan_batches(changes: &[ChangeItem], max_weight: usize) -> Vec<ChangeBatch> {
    let mut batches = Vec::new();

    for action in [ChangeAction::Upsert, ChangeAction::Delete] {
        let mut current = ChangeBatch::default();
        let mut weight = 0;

        for change in changes.iter().filter(|change| change.action == action) {
            if !current.changes.is_empty() && weight + change.weight() > max_weight {
                batches.push(std::mem::take(&mut current));
                weight = 0;
            }
            weight += change.weight();
            current.changes.push(change.clone());
        }

        if !current.changes.is_empty() {
            batches.push(current);
        }
    }

    batches
}

/// Submit `changes` to the authority.
///
/// An empty change list returns immediately without any call to the authority.
///
/// # Errors
///
/// Returns [`ApplyError::Rejected`] if the first batch fails (nothing was committed) and
/// [`ApplyError::Partial`] if a later batch fails after earlier ones were committed.
pub async fn apply_changes(
    authority: &dyn DnsAuthority,
    zone: &ZoneHandle,
    changes: &[ChangeItem],
    max_weight: usize,
) -> Result<ApplySummary, ApplyError> {
    let mut summary = ApplySummary::default();
    if changes.is_empty() {
        debug!(zone = %zone.name, "No changes to apply");
        return Ok(summary);
    }

    let batches = plan_batches(changes, max_weight);
    let total_batches = batches.len();

    for (index, batch) in batches.iter().enumerate() {
        match authority.submit_changes(zone, batch).await {
            Ok(receipt) => {
                let upserted = batch.count(ChangeAction::Upsert);
                let deleted = batch.count(ChangeAction::Delete);
                summary.upserted += upserted;
                summary.deleted += deleted;
                summary.batches += 1;
                debug!(
                    zone = %zone.name,
                    batch = index + 1,
                    total_batches,
                    upserted,
                    deleted,
                    change_id = %receipt.id,
                    status = %receipt.status,
                    "Committed change batch"
                );
            }
            Err(source) if index == 0 => {
                return Err(ApplyError::Rejected {
                    zone: zone.name.clone(),
                    total_batches,
                    source,
                });
            }
            Err(source) => {
                return Err(ApplyError::Partial {
                    zone: zone.name.clone(),
                    committed_batches: index,
                    total_batches,
                    upserted: summary.upserted,
                    deleted: summary.deleted,
                    source,
                });
            }
        }
    }

    info!(
        zone = %zone.name,
        upserted = summary.upserted,
        deleted = summary.deleted,
        batches = summary.batches,
        "Applied zone changes"
    );
    Ok(summary)
}

#[cfg(test)]
#[path = "applier_tests.rs"]
mod applier_tests;
