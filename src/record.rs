// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Value types shared by every stage of a reconciliation cycle.
//!
//! - [`Record`] - one address record set (name, kind, TTL, set of addresses)
//! - [`ZoneHandle`] - the resolved private zone a controller process writes to
//! - [`RecordSet`] - a mapping from fully-qualified record name to [`Record`]
//! - [`ObservedSet`] - the managed records the authority holds, every kind under each name
//! - [`ChangeItem`] - one upsert or delete produced by the diff engine
//!
//! Desired and observed record sets are rebuilt from scratch on every cycle and are never
//! mutated in place; only the zone handle survives between cycles.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::ops::Index;

/// Address family of a managed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKind {
    /// IPv4 address record
    A,
    /// IPv6 address record
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordKind {
    /// Kind matching the address family of `address`.
    #[must_use]
    pub fn for_address(address: &IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => Self::A,
            IpAddr::V6(_) => Self::Aaaa,
        }
    }

    /// Parse a wire record type. Returns `None` for kinds this controller does not manage.
    #[must_use]
    pub fn from_record_type(record_type: &str) -> Option<Self> {
        match record_type {
            "A" => Some(Self::A),
            "AAAA" => Some(Self::Aaaa),
            _ => None,
        }
    }

    /// Wire representation (`A` or `AAAA`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A name-to-address record set.
///
/// `values` is a set, so two records listing the same addresses in a different order are
/// equal. Addresses that parse as IP addresses are stored in canonical textual form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Fully-qualified name in trailing-dot form
    pub name: String,
    /// Address family
    pub kind: RecordKind,
    /// Time to live in seconds
    pub ttl: u32,
    /// Addresses published under `name`
    pub values: BTreeSet<String>,
}

impl Record {
    /// Build a record from raw values, canonicalising any value that parses as an address.
    pub fn new<I, S>(name: impl Into<String>, kind: RecordKind, ttl: u32, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            kind,
            ttl,
            values: values
                .into_iter()
                .map(|value| canonical_value(value.as_ref()))
                .collect(),
        }
    }

    /// Build a single-address record whose kind is derived from the address family.
    #[must_use]
    pub fn for_address(name: impl Into<String>, ttl: u32, address: IpAddr) -> Self {
        Self {
            name: name.into(),
            kind: RecordKind::for_address(&address),
            ttl,
            values: BTreeSet::from([address.to_string()]),
        }
    }

    /// Record equality as used by the diff engine: same kind, same TTL and the same set of
    /// values. The name is the map key and is not compared here.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.kind == other.kind && self.ttl == other.ttl && self.values == other.values
    }

    /// Values in their canonical (sorted) order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<&str> = self.values().collect();
        write!(
            f,
            "{} {} {} -> [{}]",
            self.name,
            self.ttl,
            self.kind,
            values.join(", ")
        )
    }
}

fn canonical_value(value: &str) -> String {
    value
        .trim()
        .parse::<IpAddr>()
        .map_or_else(|_| value.trim().to_string(), |address| address.to_string())
}

/// Mapping from fully-qualified record name to record. Keys are unique by construction.
pub type RecordSet = BTreeMap<String, Record>;

/// Target state derived from cluster membership.
pub type DesiredSet = RecordSet;

/// State currently held by the DNS authority, restricted to managed kinds.
///
/// The authority keys record sets by name and kind, so one name may carry both an `A` and an
/// `AAAA` set. The first one listed is the name's primary record and is what lookups return;
/// the others are kept as shadowed records so that a change to the name can remove them too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedSet {
    records: RecordSet,
    shadowed: BTreeMap<String, Vec<Record>>,
}

impl ObservedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listed record. Returns `false` if its name already had a primary record, in
    /// which case `record` is shadowed.
    pub fn insert(&mut self, record: Record) -> bool {
        if self.records.contains_key(&record.name) {
            self.shadowed
                .entry(record.name.clone())
                .or_default()
                .push(record);
            return false;
        }
        self.records.insert(record.name.clone(), record);
        true
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Record> {
        self.records.get(name)
    }

    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Records of other kinds listed under `name` after its primary record.
    #[must_use]
    pub fn shadowed(&self, name: &str) -> &[Record] {
        self.shadowed.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of names held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of record sets held, shadowed ones included.
    #[must_use]
    pub fn record_set_count(&self) -> usize {
        self.records.len() + self.shadowed.values().map(Vec::len).sum::<usize>()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.records.keys()
    }

    /// Primary records by name.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Record)> {
        self.records.iter()
    }
}

impl Index<&str> for ObservedSet {
    type Output = Record;

    fn index(&self, name: &str) -> &Record {
        &self.records[name]
    }
}

impl From<RecordSet> for ObservedSet {
    fn from(records: RecordSet) -> Self {
        Self {
            records,
            shadowed: BTreeMap::new(),
        }
    }
}

impl FromIterator<Record> for ObservedSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut observed = Self::new();
        for record in iter {
            observed.insert(record);
        }
        observed
    }
}

/// The private zone this process reconciles.
///
/// Resolved once per process by the zone bootstrapper and read-shared afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneHandle {
    /// Authority-assigned identifier, used in API paths
    pub id: String,
    /// Zone DNS name in trailing-dot form
    pub name: String,
    /// Network scope the zone is visible from
    pub network_scope_id: String,
}

impl fmt::Display for ZoneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Action class of a change item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeAction {
    /// Create the record or fully replace whatever is published under its name
    Upsert,
    /// Remove the record
    Delete,
}

impl ChangeAction {
    /// Lowercase label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mutation of the zone.
///
/// For an upsert, `record` is the desired record and `previous` the observed record it
/// replaces (if any). For a delete, `record` is the observed record to remove and `previous`
/// is always `None`. Either way `shadowed` lists the other managed kinds held under the same
/// name, which are removed in the same commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeItem {
    /// Action class
    pub action: ChangeAction,
    /// Record to publish (upsert) or remove (delete)
    pub record: Record,
    /// Observed record replaced by an upsert
    pub previous: Option<Record>,
    /// Further observed records under this name, removed along with the change
    pub shadowed: Vec<Record>,
}

impl ChangeItem {
    /// Publish `record`, replacing `previous` if the authority currently holds one.
    #[must_use]
    pub fn upsert(record: Record, previous: Option<Record>) -> Self {
        Self {
            action: ChangeAction::Upsert,
            record,
            previous,
            shadowed: Vec::new(),
        }
    }

    /// Remove `record` from the zone.
    #[must_use]
    pub fn delete(record: Record) -> Self {
        Self {
            action: ChangeAction::Delete,
            record,
            previous: None,
            shadowed: Vec::new(),
        }
    }

    /// Also remove `shadowed` when this change is applied.
    #[must_use]
    pub fn with_shadowed(mut self, shadowed: Vec<Record>) -> Self {
        self.shadowed = shadowed;
        self
    }

    /// Number of record set operations this change costs on the authority.
    ///
    /// Replacing an existing record is a delete plus an addition, and every shadowed record
    /// adds one more delete.
    #[must_use]
    pub fn weight(&self) -> usize {
        1 + usize::from(self.previous.is_some()) + self.shadowed.len()
    }

    /// Name of the record this change touches.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.record.name
    }
}

impl fmt::Display for ChangeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.record)
    }
}

/// Ordered sequence of changes produced by one diff.
pub type ChangeList = Vec<ChangeItem>;

/// Render a record set as `name -> values` pairs for debug logging.
#[must_use]
pub fn describe_records(records: &RecordSet) -> String {
    records
        .values()
        .map(|record| {
            let values: Vec<&str> = record.values().collect();
            format!("{} -> {}", record.name, values.join(","))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod record_tests;
