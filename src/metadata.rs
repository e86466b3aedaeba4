// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Network scope resolution.
//!
//! A private zone is bound to the network the controller runs in. On a compute instance that
//! network is read from the metadata server:
//!
//! - `project/project-id` gives the project
//! - `instance/network-interfaces/0/network` gives `projects/<number>/networks/<name>`
//!
//! and the two are combined into the network URL the DNS authority expects. The same server
//! also hands out access tokens for the instance's default service account.

use crate::constants::{
    COMPUTE_API_PREFIX, HTTP_REQUEST_TIMEOUT_SECS, METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE,
};
use crate::errors::MetadataError;
use crate::reconciler::retry::{http_backoff, is_retryable_http_status, ExponentialBackoff};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const PROJECT_ID_PATH: &str = "project/project-id";
const NETWORK_PATH: &str = "instance/network-interfaces/0/network";
const TOKEN_PATH: &str = "instance/service-accounts/default/token";

/// Resolves the network scope a private zone must be bound to.
#[async_trait]
pub trait NetworkScopeResolver: Send + Sync {
    /// Network scope identifier of the environment the controller runs in.
    async fn resolve_network_scope(&self) -> Result<String, MetadataError>;
}

/// A network scope given on the command line.
#[derive(Debug, Clone)]
pub struct StaticNetworkScope(pub String);

#[async_trait]
impl NetworkScopeResolver for StaticNetworkScope {
    async fn resolve_network_scope(&self) -> Result<String, MetadataError> {
        let scope = self.0.trim();
        if scope.is_empty() {
            return Err(MetadataError::Malformed {
                path: "--network-scope".to_string(),
                value: self.0.clone(),
            });
        }
        Ok(scope.to_string())
    }
}

/// OAuth access token handed out by the metadata server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Bearer token
    pub token: String,
    /// Remaining lifetime at the time of the fetch
    pub expires_in: Duration,
}

/// A failed metadata read and whether repeating it may help.
struct Failure {
    error: MetadataError,
    transient: bool,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Client for the compute instance metadata server.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: HttpClient,
    endpoint: String,
}

impl MetadataClient {
    /// Create a client for the metadata server at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(endpoint: &str) -> Result<Self, MetadataError> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| MetadataError::Unavailable {
                path: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Read `path`, repeating transport failures and retryable statuses per [`http_backoff`].
    async fn get(&self, path: &str) -> Result<String, MetadataError> {
        let mut backoff = http_backoff();
        let started = Instant::now();
        let mut attempt = 0_u32;

        loop {
            attempt += 1;
            let failure = match self.get_once(path).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            path,
                            attempt,
                            elapsed = ?started.elapsed(),
                            "Metadata read recovered"
                        );
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            if !failure.transient {
                return Err(failure.error);
            }
            let Some(delay) = backoff.next_backoff() else {
                error!(
                    path,
                    attempt,
                    elapsed = ?started.elapsed(),
                    error = %failure.error,
                    "Giving up on metadata read"
                );
                return Err(failure.error);
            };
            warn!(
                path,
                attempt,
                retry_in = ?delay,
                error = %failure.error,
                "Metadata read failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn get_once(&self, path: &str) -> Result<String, Failure> {
        let url = format!("{}/{path}", self.endpoint);
        let unavailable = |reason: String, transient: bool| Failure {
            error: MetadataError::Unavailable {
                path: path.to_string(),
                reason,
            },
            transient,
        };

        let response = self
            .http
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string(), true))?;
        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(
                format!("HTTP {status}"),
                is_retryable_http_status(status),
            ));
        }
        let text = response
            .text()
            .await
            .map_err(|e| unavailable(e.to_string(), true))?;

        let value = text.trim().to_string();
        if value.is_empty() {
            return Err(Failure {
                error: MetadataError::Malformed {
                    path: path.to_string(),
                    value,
                },
                transient: false,
            });
        }
        debug!(path, "Read instance metadata");
        Ok(value)
    }

    /// Project the instance belongs to.
    ///
    /// # Errors
    ///
    /// Returns a [`MetadataError`] if the metadata server cannot be read.
    pub async fn project_id(&self) -> Result<String, MetadataError> {
        self.get(PROJECT_ID_PATH).await
    }

    /// Project the instance belongs to, read again after each `backoff` delay until the
    /// metadata server answers.
    pub async fn wait_for_project_id(&self, mut backoff: ExponentialBackoff) -> String {
        loop {
            match self.project_id().await {
                Ok(project) => return project,
                Err(err) => {
                    let delay = backoff.next_backoff().unwrap_or(backoff.max_interval);
                    warn!(error = %err, retry_in = ?delay, "Project id not available yet");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Name of the network attached to the instance's first interface.
    ///
    /// # Errors
    ///
    /// Returns a [`MetadataError`] if the metadata server cannot be read or the value does
    /// not name a network.
    pub async fn network_name(&self) -> Result<String, MetadataError> {
        let value = self.get(NETWORK_PATH).await?;
        match value.rsplit_once("/networks/") {
            Some((_, name)) if !name.is_empty() && !name.contains('/') => Ok(name.to_string()),
            _ => Err(MetadataError::Malformed {
                path: NETWORK_PATH.to_string(),
                value,
            }),
        }
    }

    /// Access token of the instance's default service account.
    ///
    /// # Errors
    ///
    /// Returns a [`MetadataError`] if the token cannot be fetched or decoded.
    pub async fn access_token(&self) -> Result<AccessToken, MetadataError> {
        let body = self.get(TOKEN_PATH).await?;
        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|_| MetadataError::Malformed {
                path: TOKEN_PATH.to_string(),
                value: "<token response>".to_string(),
            })?;
        Ok(AccessToken {
            token: parsed.access_token,
            expires_in: Duration::from_secs(parsed.expires_in),
        })
    }
}

/// Build the network URL of `network` in `project`.
#[must_use]
pub fn network_url(project: &str, network: &str) -> String {
    format!("{COMPUTE_API_PREFIX}/projects/{project}/global/networks/{network}")
}

#[async_trait]
impl NetworkScopeResolver for MetadataClient {
    async fn resolve_network_scope(&self) -> Result<String, MetadataError> {
        let project = self.project_id().await?;
        let network = self.network_name().await?;
        Ok(network_url(&project, &network))
    }
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod metadata_tests;
