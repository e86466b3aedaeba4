// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use clusterzone::authority::memory::InMemoryAuthority;
use clusterzone::authority::{
    ChangeBatch, ChangeReceipt, CreateZoneRequest, DnsAuthority, HostedZone, RecordPage,
};
use clusterzone::cluster::{ClusterObserver, PodAddresses, ServiceAddress};
use clusterzone::errors::{AuthorityError, ObserverError};
use clusterzone::metadata::StaticNetworkScope;
use clusterzone::reconciler::{ReconcileSettings, Reconciler};
use clusterzone::record::ZoneHandle;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ZONE: &str = "cluster-test.local.";
pub const SCOPE: &str =
    "https://www.googleapis.com/compute/v1/projects/acme/global/networks/default";

/// Cluster membership that tests can change between cycles.
#[derive(Default)]
pub struct FakeCluster {
    pods: Mutex<Vec<PodAddresses>>,
    services: Mutex<Vec<ServiceAddress>>,
}

impl FakeCluster {
    pub fn add_pod(&self, namespace: &str, name: &str, ips: &[&str]) {
        self.pods.lock().unwrap().push(PodAddresses {
            namespace: namespace.to_string(),
            name: name.to_string(),
            ips: ips.iter().map(|ip| ip.parse().unwrap()).collect(),
        });
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) {
        self.pods
            .lock()
            .unwrap()
            .retain(|pod| !(pod.namespace == namespace && pod.name == name));
    }

    pub fn add_service(&self, namespace: &str, name: &str, cluster_ip: &str) {
        self.services.lock().unwrap().push(ServiceAddress {
            namespace: namespace.to_string(),
            name: name.to_string(),
            cluster_ip: cluster_ip.parse().unwrap(),
        });
    }

    pub fn remove_service(&self, namespace: &str, name: &str) {
        self.services
            .lock()
            .unwrap()
            .retain(|service| !(service.namespace == namespace && service.name == name));
    }

    pub fn clear(&self) {
        self.pods.lock().unwrap().clear();
        self.services.lock().unwrap().clear();
    }
}

#[async_trait]
impl ClusterObserver for FakeCluster {
    async fn list_pods(&self) -> Result<Vec<PodAddresses>, ObserverError> {
        Ok(self.pods.lock().unwrap().clone())
    }

    async fn list_services(&self) -> Result<Vec<ServiceAddress>, ObserverError> {
        Ok(self.services.lock().unwrap().clone())
    }
}

/// Delegates to an in-memory authority but fails the n-th change submission (1-based).
pub struct FlakyAuthority {
    pub inner: Arc<InMemoryAuthority>,
    fail_submission: usize,
    submissions: AtomicUsize,
}

impl FlakyAuthority {
    pub fn new(inner: Arc<InMemoryAuthority>, fail_submission: usize) -> Self {
        Self {
            inner,
            fail_submission,
            submissions: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DnsAuthority for FlakyAuthority {
    async fn find_zones(&self, dns_name: &str) -> Result<Vec<HostedZone>, AuthorityError> {
        self.inner.find_zones(dns_name).await
    }

    async fn create_private_zone(
        &self,
        request: &CreateZoneRequest,
    ) -> Result<HostedZone, AuthorityError> {
        self.inner.create_private_zone(request).await
    }

    async fn list_records(
        &self,
        zone: &ZoneHandle,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<RecordPage, AuthorityError> {
        self.inner.list_records(zone, page_token, page_size).await
    }

    async fn submit_changes(
        &self,
        zone: &ZoneHandle,
        batch: &ChangeBatch,
    ) -> Result<ChangeReceipt, AuthorityError> {
        let submission = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        if submission == self.fail_submission {
            return Err(AuthorityError::Unavailable {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        self.inner.submit_changes(zone, batch).await
    }
}

/// Reconciler for [`ZONE`] bound to [`SCOPE`].
pub fn reconciler(
    settings: ReconcileSettings,
    authority: Arc<dyn DnsAuthority>,
    cluster: Arc<FakeCluster>,
) -> Reconciler {
    Reconciler::new(
        settings,
        authority,
        cluster,
        Arc::new(StaticNetworkScope(SCOPE.to_string())),
    )
}

/// A private zone bound to [`SCOPE`] that already exists before the first cycle.
pub fn existing_zone(authority: &InMemoryAuthority) -> String {
    let id = "existing-zone".to_string();
    authority.insert_zone(HostedZone {
        id: id.clone(),
        dns_name: ZONE.to_string(),
        private: true,
        network_scopes: vec![SCOPE.to_string()],
    });
    id
}

/// Address records held for `zone_id`, keyed by name.
pub fn address_records(
    authority: &InMemoryAuthority,
    zone_id: &str,
) -> BTreeMap<String, Vec<String>> {
    authority
        .records(zone_id)
        .into_iter()
        .filter(|record| record.record_type == "A" || record.record_type == "AAAA")
        .map(|record| (record.name, record.values))
        .collect()
}

/// Record types held for `zone_id`, in listing order.
pub fn record_types(authority: &InMemoryAuthority, zone_id: &str) -> Vec<(String, String)> {
    authority
        .records(zone_id)
        .into_iter()
        .map(|record| (record.name, record.record_type))
        .collect()
}
