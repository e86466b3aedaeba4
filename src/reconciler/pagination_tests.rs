// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `pagination.rs`

#[cfg(test)]
mod tests {
    use super::super::list_all_paginated;
    use crate::constants::KUBE_LIST_PAGE_SIZE;
    use k8s_openapi::api::core::v1::Pod;
    use kube::api::ListParams;
    use kube::{Api, Client, Config};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pod(name: &str) -> serde_json::Value {
        json!({ "metadata": { "name": name, "namespace": "default" } })
    }

    fn client_for(server: &MockServer) -> Client {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let config = Config::new(server.uri().parse().unwrap());
        Client::try_from(config).unwrap()
    }

    /// Test that pagination constant has expected value
    #[test]
    fn test_pagination_constant() {
        assert_eq!(
            KUBE_LIST_PAGE_SIZE, 100,
            "Page size should be 100 items per page"
        );
    }

    #[tokio::test]
    async fn test_follows_continue_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pods"))
            .and(query_param("continue", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "PodList",
                "metadata": { "continue": "" },
                "items": [pod("c")]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pods"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "PodList",
                "metadata": { "continue": "page-2" },
                "items": [pod("a"), pod("b")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api: Api<Pod> = Api::all(client_for(&server));
        let pods = list_all_paginated(&api, ListParams::default()).await.unwrap();

        let names: Vec<_> = pods
            .iter()
            .filter_map(|pod| pod.metadata.name.clone())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_permanent_error_fails_fast() {
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
            .expect(1)
            .mount(&server)
            .await;

        let api: Api<Pod> = Api::all(client_for(&server));
        let result = list_all_paginated(&api, ListParams::default()).await;

        assert!(result.is_err());
    }
}
