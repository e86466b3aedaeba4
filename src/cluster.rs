// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster membership.
//!
//! The desired state of the zone is derived from two listings: every pod with its addresses
//! and every service with its cluster IP. [`ClusterObserver`] is the seam between the
//! reconciler and the cluster; [`KubeClusterObserver`] implements it against the Kubernetes
//! API. [`watch_cluster_changes`] turns pod and service events into reconcile triggers.

use crate::errors::ObserverError;
use crate::reconciler::pagination::list_all_paginated;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::ListParams;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Addresses of one pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodAddresses {
    /// Pod namespace
    pub namespace: String,
    /// Pod name
    pub name: String,
    /// Every address assigned to the pod (dual-stack pods have two)
    pub ips: Vec<IpAddr>,
}

/// Cluster IP of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAddress {
    /// Service namespace
    pub namespace: String,
    /// Service name
    pub name: String,
    /// Virtual IP of the service
    pub cluster_ip: IpAddr,
}

/// Read access to cluster membership.
#[async_trait]
pub trait ClusterObserver: Send + Sync {
    /// Every pod that has at least one address.
    async fn list_pods(&self) -> Result<Vec<PodAddresses>, ObserverError>;

    /// Every service with a routable cluster IP.
    async fn list_services(&self) -> Result<Vec<ServiceAddress>, ObserverError>;
}

/// Extract the addresses of a pod.
///
/// Returns `None` for pods without a primary address (not scheduled yet, or failed).
/// Addresses that do not parse are logged and skipped.
#[must_use]
pub fn pod_addresses(pod: &Pod) -> Option<PodAddresses> {
    let status = pod.status.as_ref()?;
    let primary = status.pod_ip.as_deref().filter(|ip| !ip.is_empty())?;

    let mut raw: Vec<&str> = vec![primary];
    if let Some(pod_ips) = status.pod_ips.as_ref() {
        raw.extend(pod_ips.iter().map(|entry| entry.ip.as_str()));
    }

    let namespace = pod.namespace().unwrap_or_default();
    let name = pod.name_any();
    let mut ips: Vec<IpAddr> = Vec::with_capacity(raw.len());
    for value in raw {
        match value.parse::<IpAddr>() {
            Ok(ip) if !ips.contains(&ip) => ips.push(ip),
            Ok(_) => {}
            Err(_) => warn!(
                namespace = %namespace,
                pod = %name,
                address = %value,
                "Skipping pod address that is not an IP address"
            ),
        }
    }

    if ips.is_empty() {
        return None;
    }
    Some(PodAddresses {
        namespace,
        name,
        ips,
    })
}

/// Extract the cluster IP of a service.
///
/// Returns `None` for headless services (`None`), services without a cluster IP (e.g.,
/// `ExternalName`) and values that do not parse.
#[must_use]
pub fn service_address(service: &Service) -> Option<ServiceAddress> {
    let cluster_ip = service.spec.as_ref()?.cluster_ip.as_deref()?.trim();
    if cluster_ip.is_empty() || cluster_ip.eq_ignore_ascii_case("none") {
        return None;
    }

    let namespace = service.namespace().unwrap_or_default();
    let name = service.name_any();
    match cluster_ip.parse::<IpAddr>() {
        Ok(cluster_ip) => Some(ServiceAddress {
            namespace,
            name,
            cluster_ip,
        }),
        Err(_) => {
            warn!(
                namespace = %namespace,
                service = %name,
                cluster_ip = %cluster_ip,
                "Skipping service whose cluster IP is not an IP address"
            );
            None
        }
    }
}

/// [`ClusterObserver`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeClusterObserver {
    client: Client,
}

impl KubeClusterObserver {
    /// Create an observer listing cluster-wide through `client`.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterObserver for KubeClusterObserver {
    async fn list_pods(&self) -> Result<Vec<PodAddresses>, ObserverError> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let pods = list_all_paginated(&api, ListParams::default())
            .await
            .map_err(|e| ObserverError::ListFailed {
                resource: "pods".to_string(),
                reason: format!("{e:#}"),
            })?;

        let total = pods.len();
        let addressed: Vec<PodAddresses> = pods.iter().filter_map(pod_addresses).collect();
        debug!(
            total_pods = total,
            addressed_pods = addressed.len(),
            "Listed cluster pods"
        );
        Ok(addressed)
    }

    async fn list_services(&self) -> Result<Vec<ServiceAddress>, ObserverError> {
        let api: Api<Service> = Api::all(self.client.clone());
        let services = list_all_paginated(&api, ListParams::default())
            .await
            .map_err(|e| ObserverError::ListFailed {
                resource: "services".to_string(),
                reason: format!("{e:#}"),
            })?;

        let total = services.len();
        let addressed: Vec<ServiceAddress> =
            services.iter().filter_map(service_address).collect();
        debug!(
            total_services = total,
            addressed_services = addressed.len(),
            "Listed cluster services"
        );
        Ok(addressed)
    }
}

/// Signal `trigger` whenever a pod or service changes.
///
/// Runs until the watch streams end, which they only do if the process is shutting down.
/// Watch errors are logged and the streams back off and resume on their own. Multiple
/// notifications before the reconciler wakes up collapse into one.
pub async fn watch_cluster_changes(client: Client, trigger: Arc<Notify>) {
    let pods = watcher(Api::<Pod>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .map_ok(|event| event_kind("pod", &event))
        .boxed();
    let services = watcher(Api::<Service>::all(client), watcher::Config::default())
        .default_backoff()
        .map_ok(|event| event_kind("service", &event))
        .boxed();

    let mut events = futures::stream::select(pods, services);
    while let Some(event) = events.next().await {
        match event {
            Ok(Some(kind)) => {
                debug!(resource = kind, "Cluster change observed, triggering reconcile");
                trigger.notify_one();
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Cluster watch error, backing off"),
        }
    }
    warn!("Cluster watch streams ended");
}

/// Resource label for events that change membership; `None` for bookkeeping events.
fn event_kind<K>(resource: &'static str, event: &watcher::Event<K>) -> Option<&'static str> {
    match event {
        watcher::Event::Apply(_) | watcher::Event::Delete(_) | watcher::Event::InitDone => {
            Some(resource)
        }
        watcher::Event::Init | watcher::Event::InitApply(_) => None,
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod cluster_tests;
