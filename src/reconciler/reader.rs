// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Authoritative state reader.
//!
//! Pages through every record set of the zone and keeps the address records (`A`, `AAAA`).
//! Everything else (apex `SOA` and `NS`, `TXT`, ...) never enters the observed set and so can
//! never be deleted.

use crate::authority::DnsAuthority;
use crate::errors::{AuthorityError, ReadError};
use crate::record::{ObservedSet, ZoneHandle};
use tracing::{debug, warn};

/// List the managed records currently held by the authority for `zone`.
///
/// An empty zone yields an empty set. If the authority lists two managed kinds under one
/// name, the first one listed is the name's primary record and the other is kept as shadowed.
///
/// # Errors
///
/// Returns [`ReadError::Authority`] naming the failing page if any page cannot be fetched,
/// or if the authority hands back the continuation token it was just given.
pub async fn list_managed_records(
    authority: &dyn DnsAuthority,
    zone: &ZoneHandle,
    page_size: u32,
) -> Result<ObservedSet, ReadError> {
    let mut observed = ObservedSet::new();
    let mut page_token: Option<String> = None;
    let mut page_number = 0;
    let mut listed = 0;

    loop {
        page_number += 1;
        let page = authority
            .list_records(zone, page_token.as_deref(), page_size)
            .await
            .map_err(|source| ReadError::Authority {
                zone: zone.name.clone(),
                page: page_number,
                source,
            })?;

        listed += page.records.len();
        debug!(
            zone = %zone.name,
            page = page_number,
            records_in_page = page.records.len(),
            "Fetched record page"
        );

        for raw in &page.records {
            let Some(record) = raw.to_record() else {
                continue;
            };
            let name = record.name.clone();
            let kind = record.kind;
            if !observed.insert(record) {
                warn!(
                    zone = %zone.name,
                    name = %name,
                    primary = ?observed.get(&name).map(|held| held.kind),
                    shadowed = %kind,
                    "Authority holds several managed record kinds under one name"
                );
            }
        }

        match page.next_page_token {
            Some(next) if page_token.as_deref() == Some(next.as_str()) => {
                return Err(ReadError::Authority {
                    zone: zone.name.clone(),
                    page: page_number,
                    source: AuthorityError::Decode(format!(
                        "continuation token '{next}' repeated"
                    )),
                });
            }
            Some(next) => page_token = Some(next),
            None => break,
        }
    }

    debug!(
        zone = %zone.name,
        pages = page_number,
        listed,
        managed = observed.record_set_count(),
        "Listed zone records"
    );
    Ok(observed)
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod reader_tests;
