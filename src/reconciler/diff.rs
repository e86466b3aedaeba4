// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Diff engine.
//!
//! Compares the desired record set with the observed one and produces the changes that make
//! the zone match the cluster:
//!
//! - a desired name missing from the zone is an upsert
//! - a desired name whose record differs in kind, TTL or value set is an upsert replacing the
//!   observed record
//! - an observed name that is no longer desired is a delete
//!
//! A name the authority holds under more than one managed kind always changes: the upsert or
//! delete carries the extra kinds so the commit leaves exactly one record set behind.
//!
//! Value order is irrelevant; equal records produce no change. Inputs are never modified;
//! the delete set is computed as a set difference into a new list.

use crate::errors::DiffError;
use crate::record::{ChangeItem, ChangeList, DesiredSet, ObservedSet};

/// Compute the changes turning `observed` into `desired`.
///
/// Upserts come first, then deletes, each ordered by record name.
///
/// # Errors
///
/// Returns a [`DiffError`] if a desired record is stored under a key other than its name, or
/// has no values. Both indicate a broken desired set builder.
pub fn diff(desired: &DesiredSet, observed: &ObservedSet) -> Result<ChangeList, DiffError> {
    for (key, record) in desired {
        if key != &record.name {
            return Err(DiffError::KeyMismatch {
                key: key.clone(),
                name: record.name.clone(),
            });
        }
        if record.values.is_empty() {
            return Err(DiffError::EmptyRecord {
                name: record.name.clone(),
            });
        }
    }

    let upserts = desired.iter().filter_map(|(name, wanted)| {
        let shadowed = observed.shadowed(name);
        match observed.get(name) {
            Some(held) if held.same_content(wanted) && shadowed.is_empty() => None,
            held => Some(
                ChangeItem::upsert(wanted.clone(), held.cloned()).with_shadowed(shadowed.to_vec()),
            ),
        }
    });

    let deletes = observed
        .iter()
        .filter(|(name, _)| !desired.contains_key(*name))
        .map(|(name, held)| {
            ChangeItem::delete(held.clone()).with_shadowed(observed.shadowed(name).to_vec())
        });

    Ok(upserts.chain(deletes).collect())
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;
