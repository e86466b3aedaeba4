// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-process DNS authority.
//!
//! Behaves like a hosted DNS service as far as the reconciliation engine can observe:
//!
//! - zone creation is idempotent per creation token and seeds apex `SOA`/`NS` records
//! - listings are paged with a server-side page size cap
//! - change batches are atomic: every deletion must match the held record set exactly and
//!   every addition must not exist yet, otherwise nothing is applied
//! - batches above the configured size are rejected
//!
//! Failures can be injected per operation to exercise error paths.

use super::{
    ChangeBatch, ChangeReceipt, CreateZoneRequest, DnsAuthority, HostedZone, RawRecordSet,
    RecordPage,
};
use crate::constants::{DEFAULT_MAX_CHANGES_PER_BATCH, MAX_RECORD_PAGE_SIZE};
use crate::errors::AuthorityError;
use crate::record::ZoneHandle;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Authority operations, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorityOperation {
    /// [`DnsAuthority::find_zones`]
    FindZones,
    /// [`DnsAuthority::create_private_zone`]
    CreateZone,
    /// [`DnsAuthority::list_records`]
    ListRecords,
    /// [`DnsAuthority::submit_changes`]
    SubmitChanges,
}

type RecordKey = (String, String);

#[derive(Debug)]
struct StoredZone {
    zone: HostedZone,
    records: BTreeMap<RecordKey, RawRecordSet>,
}

#[derive(Debug, Default)]
struct State {
    zones: BTreeMap<String, StoredZone>,
    creation_tokens: HashMap<String, String>,
    next_zone_id: u64,
    next_change_id: u64,
    injected: VecDeque<(AuthorityOperation, AuthorityError)>,
    calls: HashMap<AuthorityOperation, usize>,
    submitted: Vec<ChangeBatch>,
}

/// In-memory [`DnsAuthority`].
#[derive(Debug)]
pub struct InMemoryAuthority {
    state: Mutex<State>,
    max_page_size: u32,
    max_batch_weight: usize,
}

impl Default for InMemoryAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthority {
    /// Create an empty authority with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_page_size: MAX_RECORD_PAGE_SIZE,
            max_batch_weight: DEFAULT_MAX_CHANGES_PER_BATCH,
        }
    }

    /// Cap the number of record sets returned per page, whatever the caller requests.
    #[must_use]
    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    /// Reject batches with more than `max_batch_weight` record set operations.
    #[must_use]
    pub fn with_max_batch_weight(mut self, max_batch_weight: usize) -> Self {
        self.max_batch_weight = max_batch_weight.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an existing zone (no apex records are seeded).
    pub fn insert_zone(&self, zone: HostedZone) {
        let mut state = self.lock();
        state.zones.insert(
            zone.id.clone(),
            StoredZone {
                zone,
                records: BTreeMap::new(),
            },
        );
    }

    /// Put a record set into a zone, bypassing change validation.
    ///
    /// Simulates a mutation made by someone other than the controller.
    pub fn insert_record(&self, zone_id: &str, record: RawRecordSet) {
        let mut state = self.lock();
        if let Some(stored) = state.zones.get_mut(zone_id) {
            stored.records.insert(
                (record.name.clone(), record.record_type.clone()),
                record,
            );
        }
    }

    /// Every record set currently held by a zone, in listing order.
    #[must_use]
    pub fn records(&self, zone_id: &str) -> Vec<RawRecordSet> {
        self.lock()
            .zones
            .get(zone_id)
            .map(|stored| stored.records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every zone held by the authority.
    #[must_use]
    pub fn zones(&self) -> Vec<HostedZone> {
        self.lock()
            .zones
            .values()
            .map(|stored| stored.zone.clone())
            .collect()
    }

    /// Fail the next call of `operation` with `error`. Injected failures queue up.
    pub fn fail_next(&self, operation: AuthorityOperation, error: AuthorityError) {
        self.lock().injected.push_back((operation, error));
    }

    /// Number of calls made to `operation`, including failed ones.
    #[must_use]
    pub fn calls(&self, operation: AuthorityOperation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Batches that were committed, in commit order.
    #[must_use]
    pub fn committed_batches(&self) -> Vec<ChangeBatch> {
        self.lock().submitted.clone()
    }

    fn enter(
        &self,
        operation: AuthorityOperation,
    ) -> Result<MutexGuard<'_, State>, AuthorityError> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_insert(0) += 1;
        if let Some(position) = state.injected.iter().position(|(op, _)| *op == operation) {
            if let Some((_, error)) = state.injected.remove(position) {
                return Err(error);
            }
        }
        Ok(state)
    }
}

fn seeded_apex(dns_name: &str) -> Vec<RawRecordSet> {
    vec![
        RawRecordSet {
            name: dns_name.to_string(),
            record_type: "NS".to_string(),
            ttl: 21600,
            values: vec!["ns-memory.local.".to_string()],
        },
        RawRecordSet {
            name: dns_name.to_string(),
            record_type: "SOA".to_string(),
            ttl: 21600,
            values: vec![format!(
                "ns-memory.local. hostmaster.{dns_name} 1 21600 3600 259200 300"
            )],
        },
    ]
}

fn not_found(zone: &ZoneHandle) -> AuthorityError {
    AuthorityError::NotFound {
        what: format!("zone {}", zone.id),
    }
}

fn same_record_set(held: &RawRecordSet, expected: &RawRecordSet) -> bool {
    let mut held_values = held.values.clone();
    let mut expected_values = expected.values.clone();
    held_values.sort();
    expected_values.sort();
    held.ttl == expected.ttl && held_values == expected_values
}

#[async_trait]
impl DnsAuthority for InMemoryAuthority {
    async fn find_zones(&self, dns_name: &str) -> Result<Vec<HostedZone>, AuthorityError> {
        let state = self.enter(AuthorityOperation::FindZones)?;
        Ok(state
            .zones
            .values()
            .filter(|stored| stored.zone.dns_name.eq_ignore_ascii_case(dns_name))
            .map(|stored| stored.zone.clone())
            .collect())
    }

    async fn create_private_zone(
        &self,
        request: &CreateZoneRequest,
    ) -> Result<HostedZone, AuthorityError> {
        let mut state = self.enter(AuthorityOperation::CreateZone)?;

        if let Some(zone_id) = state.creation_tokens.get(&request.creation_token) {
            if let Some(stored) = state.zones.get(zone_id) {
                return Ok(stored.zone.clone());
            }
        }

        let taken = state.zones.values().any(|stored| {
            stored.zone.dns_name.eq_ignore_ascii_case(&request.dns_name)
                && stored.zone.is_private_to(&request.network_scope)
        });
        if taken {
            return Err(AuthorityError::AlreadyExists {
                what: format!("private zone {}", request.dns_name),
            });
        }

        state.next_zone_id += 1;
        let zone = HostedZone {
            id: format!("zone-{}", state.next_zone_id),
            dns_name: request.dns_name.clone(),
            private: true,
            network_scopes: vec![request.network_scope.clone()],
        };
        let records = seeded_apex(&request.dns_name)
            .into_iter()
            .map(|record| ((record.name.clone(), record.record_type.clone()), record))
            .collect();
        state
            .creation_tokens
            .insert(request.creation_token.clone(), zone.id.clone());
        state.zones.insert(
            zone.id.clone(),
            StoredZone {
                zone: zone.clone(),
                records,
            },
        );
        debug!(zone = %zone.dns_name, id = %zone.id, "Created in-memory private zone");
        Ok(zone)
    }

    async fn list_records(
        &self,
        zone: &ZoneHandle,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<RecordPage, AuthorityError> {
        let state = self.enter(AuthorityOperation::ListRecords)?;
        let stored = state.zones.get(&zone.id).ok_or_else(|| not_found(zone))?;

        let offset = match page_token {
            Some(token) => token.parse::<usize>().map_err(|_| AuthorityError::Rejected {
                status: 400,
                message: format!("invalid page token '{token}'"),
            })?,
            None => 0,
        };
        let limit = page_size.clamp(1, self.max_page_size) as usize;

        let records: Vec<RawRecordSet> = stored
            .records
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        let next = offset + records.len();
        let next_page_token = (next < stored.records.len()).then(|| next.to_string());

        Ok(RecordPage {
            records,
            next_page_token,
        })
    }

    async fn submit_changes(
        &self,
        zone: &ZoneHandle,
        batch: &ChangeBatch,
    ) -> Result<ChangeReceipt, AuthorityError> {
        let mut state = self.enter(AuthorityOperation::SubmitChanges)?;

        if batch.changes.is_empty() {
            return Err(AuthorityError::Rejected {
                status: 400,
                message: "change batch is empty".to_string(),
            });
        }
        if batch.weight() > self.max_batch_weight {
            return Err(AuthorityError::Rejected {
                status: 400,
                message: format!(
                    "change batch has {} operations, limit is {}",
                    batch.weight(),
                    self.max_batch_weight
                ),
            });
        }

        let stored = state.zones.get(&zone.id).ok_or_else(|| not_found(zone))?;
        let mut records = stored.records.clone();

        for deletion in batch.deletions() {
            let key = (deletion.name.clone(), deletion.record_type.clone());
            match records.get(&key) {
                Some(held) if same_record_set(held, &deletion) => {
                    records.remove(&key);
                }
                _ => {
                    return Err(AuthorityError::Rejected {
                        status: 412,
                        message: format!(
                            "conditionNotMet: {} {} does not match the held record set",
                            deletion.name, deletion.record_type
                        ),
                    });
                }
            }
        }
        for addition in batch.additions() {
            let key = (addition.name.clone(), addition.record_type.clone());
            if records.contains_key(&key) {
                return Err(AuthorityError::AlreadyExists {
                    what: format!("record set {} {}", addition.name, addition.record_type),
                });
            }
            records.insert(key, addition);
        }

        if let Some(stored) = state.zones.get_mut(&zone.id) {
            stored.records = records;
        }
        state.submitted.push(batch.clone());
        state.next_change_id += 1;

        Ok(ChangeReceipt {
            id: state.next_change_id.to_string(),
            status: "done".to_string(),
        })
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
