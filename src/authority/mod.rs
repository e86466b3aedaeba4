// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS authority abstraction.
//!
//! The reconciliation engine never talks to a DNS provider directly; it goes through the
//! [`DnsAuthority`] trait, which exposes exactly the four operations a cycle needs:
//!
//! 1. **Zone lookup by name** - [`DnsAuthority::find_zones`]
//! 2. **Private zone creation** - [`DnsAuthority::create_private_zone`]
//! 3. **Paginated record listing** - [`DnsAuthority::list_records`]
//! 4. **Atomic change submission** - [`DnsAuthority::submit_changes`]
//!
//! # Implementations
//!
//! - [`cloud_dns::CloudDnsAuthority`] - Cloud DNS v1 REST API
//! - [`memory::InMemoryAuthority`] - in-process authority for tests and local dry runs
//!
//! Implementations report failures and return; retry scheduling across cycles belongs to
//! the scheduler.

pub mod cloud_dns;
pub mod memory;

use crate::errors::AuthorityError;
use crate::record::{ChangeAction, ChangeItem, Record, RecordKind, ZoneHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A zone as reported by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    /// Authority-assigned identifier
    pub id: String,
    /// Zone DNS name in trailing-dot form
    pub dns_name: String,
    /// Whether the zone is only resolvable from bound networks
    pub private: bool,
    /// Network scopes the zone is bound to
    pub network_scopes: Vec<String>,
}

impl HostedZone {
    /// Whether this is a private zone bound to `scope`.
    #[must_use]
    pub fn is_private_to(&self, scope: &str) -> bool {
        self.private
            && self
                .network_scopes
                .iter()
                .any(|bound| scopes_match(bound, scope))
    }
}

/// Parameters of a private zone creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateZoneRequest {
    /// Zone DNS name in trailing-dot form
    pub dns_name: String,
    /// Network scope the zone is bound to
    pub network_scope: String,
    /// Unique token; the authority treats a repeated token as the same request
    pub creation_token: String,
    /// Human readable description
    pub description: String,
}

/// A record set exactly as listed by the authority, of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecordSet {
    /// Fully-qualified name
    pub name: String,
    /// Wire record type (`A`, `AAAA`, `SOA`, `NS`, ...)
    pub record_type: String,
    /// Time to live in seconds
    pub ttl: u32,
    /// Record data
    pub values: Vec<String>,
}

impl RawRecordSet {
    /// Convert to a managed [`Record`]; `None` for unmanaged kinds.
    #[must_use]
    pub fn to_record(&self) -> Option<Record> {
        let kind = RecordKind::from_record_type(&self.record_type)?;
        Some(Record::new(self.name.clone(), kind, self.ttl, &self.values))
    }
}

impl From<&Record> for RawRecordSet {
    fn from(record: &Record) -> Self {
        Self {
            name: record.name.clone(),
            record_type: record.kind.as_str().to_string(),
            ttl: record.ttl,
            values: record.values().map(str::to_string).collect(),
        }
    }
}

/// One page of a record listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPage {
    /// Record sets on this page
    pub records: Vec<RawRecordSet>,
    /// Continuation token; `None` on the last page
    pub next_page_token: Option<String>,
}

/// A group of changes submitted as one atomic commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Changes in submission order
    pub changes: Vec<ChangeItem>,
}

impl ChangeBatch {
    /// Number of record set operations in this batch.
    #[must_use]
    pub fn weight(&self) -> usize {
        self.changes.iter().map(ChangeItem::weight).sum()
    }

    /// Number of changes of the given action class.
    #[must_use]
    pub fn count(&self, action: ChangeAction) -> usize {
        self.changes
            .iter()
            .filter(|change| change.action == action)
            .count()
    }

    /// Record sets to remove: every delete, the record each upsert replaces, and every
    /// shadowed record either one carries.
    #[must_use]
    pub fn deletions(&self) -> Vec<RawRecordSet> {
        self.changes
            .iter()
            .flat_map(|change| {
                let primary = match change.action {
                    ChangeAction::Delete => Some(&change.record),
                    ChangeAction::Upsert => change.previous.as_ref(),
                };
                primary
                    .into_iter()
                    .chain(&change.shadowed)
                    .map(RawRecordSet::from)
            })
            .collect()
    }

    /// Record sets to add: the desired record of every upsert.
    #[must_use]
    pub fn additions(&self) -> Vec<RawRecordSet> {
        self.changes
            .iter()
            .filter(|change| change.action == ChangeAction::Upsert)
            .map(|change| RawRecordSet::from(&change.record))
            .collect()
    }
}

/// Acknowledgement of a submitted change batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReceipt {
    /// Authority-assigned change identifier
    pub id: String,
    /// Propagation status reported by the authority (e.g., `pending`, `done`)
    pub status: String,
}

/// Operations the reconciliation engine needs from a DNS authority.
#[async_trait]
pub trait DnsAuthority: Send + Sync {
    /// List every zone whose DNS name is `dns_name`. An empty result is not an error.
    async fn find_zones(&self, dns_name: &str) -> Result<Vec<HostedZone>, AuthorityError>;

    /// Create a private zone bound to `request.network_scope`.
    ///
    /// Returns [`AuthorityError::AlreadyExists`] if the name is already taken.
    async fn create_private_zone(
        &self,
        request: &CreateZoneRequest,
    ) -> Result<HostedZone, AuthorityError>;

    /// Fetch one page of the zone's record sets, of every kind.
    async fn list_records(
        &self,
        zone: &ZoneHandle,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<RecordPage, AuthorityError>;

    /// Apply all changes of `batch` as one atomic commit.
    async fn submit_changes(
        &self,
        zone: &ZoneHandle,
        batch: &ChangeBatch,
    ) -> Result<ChangeReceipt, AuthorityError>;
}

/// Compare two network scope identifiers.
///
/// Scopes compare on their `projects/<project>/.../<network>` path, so a full resource URL
/// and a bare resource path name the same network.
#[must_use]
pub fn scopes_match(left: &str, right: &str) -> bool {
    network_path(left) == network_path(right)
}

fn network_path(scope: &str) -> &str {
    let scope = scope.trim().trim_end_matches('/');
    scope
        .find("projects/")
        .map_or(scope, |start| &scope[start..])
}
