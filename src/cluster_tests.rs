// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cluster.rs`

#[cfg(test)]
mod tests {
    use crate::cluster::{
        pod_addresses, service_address, ClusterObserver, KubeClusterObserver,
    };
    use crate::errors::ObserverError;
    use k8s_openapi::api::core::v1::{Pod, PodIP, PodStatus, Service, ServiceSpec};
    use kube::api::ObjectMeta;
    use kube::{Client, Config};
    use serde_json::json;
    use std::net::IpAddr;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn meta(namespace: &str, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }
    }

    fn pod(pod_ip: Option<&str>, pod_ips: &[&str]) -> Pod {
        Pod {
            metadata: meta("default", "web-0"),
            status: Some(PodStatus {
                pod_ip: pod_ip.map(str::to_string),
                pod_ips: Some(
                    pod_ips
                        .iter()
                        .map(|ip| PodIP { ip: (*ip).to_string() })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn service(cluster_ip: Option<&str>) -> Service {
        Service {
            metadata: meta("default", "web"),
            spec: Some(ServiceSpec {
                cluster_ip: cluster_ip.map(str::to_string),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn ip(value: &str) -> IpAddr {
        value.parse().unwrap()
    }

    #[test]
    fn test_pod_without_address_is_skipped() {
        assert!(pod_addresses(&pod(None, &[])).is_none());
        assert!(pod_addresses(&pod(Some(""), &[])).is_none());
        assert!(pod_addresses(&Pod::default()).is_none());
    }

    #[test]
    fn test_dual_stack_pod_yields_both_addresses() {
        let addresses = pod_addresses(&pod(Some("10.0.0.5"), &["10.0.0.5", "fd00::5"])).unwrap();

        assert_eq!(addresses.namespace, "default");
        assert_eq!(addresses.name, "web-0");
        assert_eq!(addresses.ips, vec![ip("10.0.0.5"), ip("fd00::5")]);
    }

    #[test]
    fn test_invalid_pod_address_is_skipped() {
        assert!(pod_addresses(&pod(Some("garbage"), &[])).is_none());

        let addresses = pod_addresses(&pod(Some("10.0.0.5"), &["not-an-ip"])).unwrap();
        assert_eq!(addresses.ips, vec![ip("10.0.0.5")]);
    }

    #[test]
    fn test_service_cluster_ip() {
        let address = service_address(&service(Some("10.96.0.10"))).unwrap();

        assert_eq!(address.name, "web");
        assert_eq!(address.cluster_ip, ip("10.96.0.10"));
    }

    #[test]
    fn test_services_without_cluster_ip_are_skipped() {
        assert!(service_address(&service(Some("None"))).is_none());
        assert!(service_address(&service(Some(""))).is_none());
        assert!(service_address(&service(None)).is_none());
        assert!(service_address(&service(Some("bogus"))).is_none());
        assert!(service_address(&Service::default()).is_none());
    }

    #[tokio::test]
    async fn test_kube_observer_lists_services() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "ServiceList",
                "metadata": {},
                "items": [
                    { "metadata": { "name": "api", "namespace": "prod" }, "spec": { "clusterIP": "10.96.1.1" } },
                    { "metadata": { "name": "db", "namespace": "prod" }, "spec": { "clusterIP": "None" } }
                ]
            })))
            .mount(&server)
            .await;

        let _ = rustls::crypto::ring::default_provider().install_default();
        let client = Client::try_from(Config::new(server.uri().parse().unwrap())).unwrap();
        let services = KubeClusterObserver::new(client).list_services().await.unwrap();

        assert_eq!(services.len(), 1);
        assert_eq!(services[0].namespace, "prod");
        assert_eq!(services[0].cluster_ip, ip("10.96.1.1"));
    }

    #[tokio::test]
    async fn test_kube_observer_reports_list_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pods"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "kind": "Status",
                "apiVersion": "v1",
                "status": "Failure",
                "message": "pods is forbidden",
                "reason": "Forbidden",
                "code": 403
            })))
            .mount(&server)
            .await;

        let _ = rustls::crypto::ring::default_provider().install_default();
        let client = Client::try_from(Config::new(server.uri().parse().unwrap())).unwrap();
        let result = KubeClusterObserver::new(client).list_pods().await;

        match result {
            Err(ObserverError::ListFailed { resource, .. }) => assert_eq!(resource, "pods"),
            other => panic!("expected ListFailed, got {other:?}"),
        }
    }
}
