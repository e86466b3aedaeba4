// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `metrics_server.rs`

#[cfg(test)]
mod tests {
    use crate::metrics::record_cycle;
    use crate::metrics_server::router;
    use crate::reconciler::{ReconcileState, ReconcileStatus};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::watch;
    use tower::ServiceExt;

    async fn get(status: watch::Receiver<ReconcileStatus>, uri: &str) -> (StatusCode, String) {
        let response = router(status)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let code = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (code, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_healthz_is_always_ok() {
        let (_tx, rx) = watch::channel(ReconcileStatus::default());

        let (code, body) = get(rx, "/healthz").await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn test_readyz_before_first_success() {
        let (_tx, rx) = watch::channel(ReconcileStatus::default());

        let (code, body) = get(rx, "/readyz").await;

        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("no reconciliation cycle has succeeded yet"));
    }

    #[tokio::test]
    async fn test_readyz_reports_last_error() {
        let (_tx, rx) = watch::channel(ReconcileStatus {
            state: ReconcileState::Scheduled,
            last_success: None,
            last_error: Some("unable to read cluster membership".to_string()),
            consecutive_failures: 1,
        });

        let (code, body) = get(rx, "/readyz").await;

        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("unable to read cluster membership"));
    }

    #[tokio::test]
    async fn test_readyz_after_success() {
        let (tx, rx) = watch::channel(ReconcileStatus::default());
        tx.send_modify(|status| status.last_success = Some(Utc::now()));

        let (code, _) = get(rx, "/readyz").await;

        assert_eq!(code, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_text_format() {
        record_cycle("success", Duration::from_millis(10));
        let (_tx, rx) = watch::channel(ReconcileStatus::default());

        let (code, body) = get(rx, "/metrics").await;

        assert_eq!(code, StatusCode::OK);
        assert!(body.contains("clusterzone_cycles_total"));
    }
}
