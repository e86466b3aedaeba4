// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP server for Prometheus scraping and Kubernetes probes.
//!
//! | Path       | Response                                                   |
//! |------------|------------------------------------------------------------|
//! | `/metrics` | Prometheus text format                                     |
//! | `/healthz` | Always `200 OK` while the process serves requests          |
//! | `/readyz`  | `200 OK` once a cycle has succeeded, `503` before that     |

use crate::constants::{HEALTHZ_PATH, METRICS_SERVER_PATH, READYZ_PATH};
use crate::metrics::gather_metrics;
use crate::reconciler::ReconcileStatus;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::{error, info};

const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Build the router, reading readiness from `status`.
pub fn router(status: watch::Receiver<ReconcileStatus>) -> Router {
    Router::new()
        .route(METRICS_SERVER_PATH, get(metrics_handler))
        .route(HEALTHZ_PATH, get(healthz_handler))
        .route(READYZ_PATH, get(readyz_handler))
        .with_state(status)
}

/// Serve the router on `bind_address` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve<F>(
    bind_address: SocketAddr,
    status: watch::Receiver<ReconcileStatus>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("failed to bind metrics server to {bind_address}"))?;
    info!(address = %bind_address, "Metrics server listening");

    axum::serve(listener, router(status))
        .with_graceful_shutdown(shutdown)
        .await
        .context("metrics server failed")
}

async fn metrics_handler() -> impl IntoResponse {
    match gather_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [("content-type", TEXT_CONTENT_TYPE)],
            text,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", TEXT_CONTENT_TYPE)],
                format!("# failed to encode metrics: {e}\n"),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readyz_handler(
    State(status): State<watch::Receiver<ReconcileStatus>>,
) -> impl IntoResponse {
    let status = status.borrow().clone();
    if status.is_ready() {
        (StatusCode::OK, "OK".to_string())
    } else {
        let reason = status
            .last_error
            .unwrap_or_else(|| "no reconciliation cycle has succeeded yet".to_string());
        (StatusCode::SERVICE_UNAVAILABLE, format!("NOT READY: {reason}"))
    }
}

#[cfg(test)]
#[path = "metrics_server_tests.rs"]
mod metrics_server_tests;
