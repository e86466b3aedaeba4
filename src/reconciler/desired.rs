// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired state builder.
//!
//! Naming scheme, relative to the zone apex:
//!
//! | Source  | Record name                          | Example                                   |
//! |---------|--------------------------------------|-------------------------------------------|
//! | Pod     | `<address>.<namespace>.pod.<zone>`   | `10-0-0-5.default.pod.cluster-test.local.` |
//! | Service | `<name>.<namespace>.svc.<zone>`      | `web.default.svc.cluster-test.local.`      |
//!
//! Pod addresses have their separators (`.` and `:`) replaced by `-`. IPv4 addresses become
//! `A` records and IPv6 addresses `AAAA` records.

use crate::cluster::{PodAddresses, ServiceAddress};
use crate::constants::{POD_SUBDOMAIN, SERVICE_SUBDOMAIN};
use crate::record::{DesiredSet, Record};
use std::collections::btree_map::Entry;
use std::net::IpAddr;
use tracing::warn;

/// `zone` in trailing-dot form.
#[must_use]
pub fn absolute_zone(zone: &str) -> String {
    format!("{}.", zone.trim().trim_end_matches('.'))
}

/// Record name of a pod address.
#[must_use]
pub fn pod_record_name(address: &IpAddr, namespace: &str, zone: &str) -> String {
    let label = address.to_string().replace(['.', ':'], "-");
    format!(
        "{label}.{namespace}.{POD_SUBDOMAIN}.{}",
        absolute_zone(zone)
    )
}

/// Record name of a service.
#[must_use]
pub fn service_record_name(name: &str, namespace: &str, zone: &str) -> String {
    format!(
        "{name}.{namespace}.{SERVICE_SUBDOMAIN}.{}",
        absolute_zone(zone)
    )
}

/// Build the records the zone should hold for the given cluster membership.
///
/// Inputs are processed in a fixed order (services, then pods, each sorted by namespace,
/// name and address), so the result does not depend on listing order. Two sources mapping
/// to the same name are merged if their records have the same kind; otherwise the first one
/// in that order is kept and the collision is logged.
#[must_use]
pub fn build_desired_set(
    zone: &str,
    ttl: u32,
    pods: &[PodAddresses],
    services: &[ServiceAddress],
) -> DesiredSet {
    let mut services: Vec<&ServiceAddress> = services.iter().collect();
    services.sort_by(|a, b| {
        (&a.namespace, &a.name, a.cluster_ip).cmp(&(&b.namespace, &b.name, b.cluster_ip))
    });
    let mut pods: Vec<&PodAddresses> = pods.iter().collect();
    pods.sort_by(|a, b| {
        (&a.namespace, &a.name, &a.ips).cmp(&(&b.namespace, &b.name, &b.ips))
    });

    let mut desired = DesiredSet::new();

    for service in services {
        let name = service_record_name(&service.name, &service.namespace, zone);
        merge(
            &mut desired,
            Record::for_address(name, ttl, service.cluster_ip),
            &format!("service {}/{}", service.namespace, service.name),
        );
    }

    for pod in pods {
        for address in &pod.ips {
            let name = pod_record_name(address, &pod.namespace, zone);
            merge(
                &mut desired,
                Record::for_address(name, ttl, *address),
                &format!("pod {}/{}", pod.namespace, pod.name),
            );
        }
    }

    desired
}

fn merge(desired: &mut DesiredSet, record: Record, source: &str) {
    match desired.entry(record.name.clone()) {
        Entry::Vacant(slot) => {
            slot.insert(record);
        }
        Entry::Occupied(mut slot) => {
            let existing = slot.get_mut();
            if existing.kind == record.kind {
                existing.values.extend(record.values);
            } else {
                warn!(
                    name = %record.name,
                    kept = %existing.kind,
                    dropped = %record.kind,
                    source,
                    "Record name collision between kinds, keeping the first record"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "desired_tests.rs"]
mod desired_tests;
