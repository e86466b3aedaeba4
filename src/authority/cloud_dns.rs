// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cloud DNS v1 REST API adapter.
//!
//! Maps the four [`DnsAuthority`] operations onto the managed zone, resource record set and
//! change resources of the Cloud DNS JSON API.
//!
//! # Retry Behavior
//!
//! - Lookups, listings and zone creation retry on HTTP 429, 500, 502, 503, 504 and transport
//!   errors using the HTTP backoff (50ms initial, 10s max interval, 2 minutes total). Zone
//!   creation is safe to repeat because it carries a `clientOperationId`.
//! - Change submissions retry only on HTTP 429: a 5xx may hide a committed change, and
//!   resubmitting it would fail its delete preconditions anyway.
//! - Any other 4xx fails immediately.

use super::{
    ChangeBatch, ChangeReceipt, CreateZoneRequest, DnsAuthority, HostedZone, RawRecordSet,
    RecordPage,
};
use crate::constants::{ACCESS_TOKEN_REFRESH_MARGIN_SECS, HTTP_REQUEST_TIMEOUT_SECS};
use crate::errors::AuthorityError;
use crate::metadata::MetadataClient;
use crate::metrics;
use crate::reconciler::retry::{http_backoff, is_retryable_http_status};
use crate::record::ZoneHandle;
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use url::Url;

/// Where bearer tokens for the API come from.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// A fixed token, sent as is
    Static(String),
    /// Tokens of the instance's default service account, fetched from the metadata server
    Metadata(MetadataClient),
    /// No `Authorization` header (API emulators)
    Anonymous,
}

/// Connection settings for [`CloudDnsAuthority`].
#[derive(Debug, Clone)]
pub struct CloudDnsConfig {
    /// API base URL, e.g. `https://dns.googleapis.com/dns/v1`
    pub endpoint: String,
    /// Project owning the managed zones
    pub project: String,
    /// Bearer token source
    pub credentials: Credentials,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl CloudDnsConfig {
    /// Settings with the default request timeout.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        project: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            project: project.into(),
            credentials,
            request_timeout: Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Which failures of a request are worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryPolicy {
    /// 429, retryable 5xx and transport errors
    Transient,
    /// 429 only
    RateLimitOnly,
}

impl RetryPolicy {
    fn allows(self, error: &AuthorityError) -> bool {
        match self {
            Self::Transient => error.is_transient(),
            Self::RateLimitOnly => matches!(
                error,
                AuthorityError::Unavailable { status, .. }
                    if *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            ),
        }
    }
}

// ----------------------------------------------------------------------------
// Wire types
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedZone {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    dns_name: String,
    #[serde(default)]
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    visibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private_visibility_config: Option<PrivateVisibilityConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PrivateVisibilityConfig {
    #[serde(default)]
    networks: Vec<NetworkRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkRef {
    network_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedZonesPage {
    #[serde(default)]
    managed_zones: Vec<ManagedZone>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResourceRecordSet {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    rrdatas: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceRecordSetsPage {
    #[serde(default)]
    rrsets: Vec<ResourceRecordSet>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Change {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    additions: Vec<ResourceRecordSet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    deletions: Vec<ResourceRecordSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

impl From<RawRecordSet> for ResourceRecordSet {
    fn from(raw: RawRecordSet) -> Self {
        Self {
            name: raw.name,
            record_type: raw.record_type,
            ttl: raw.ttl,
            rrdatas: raw.values,
        }
    }
}

impl From<ResourceRecordSet> for RawRecordSet {
    fn from(rrset: ResourceRecordSet) -> Self {
        Self {
            name: rrset.name,
            record_type: rrset.record_type,
            ttl: rrset.ttl,
            values: rrset.rrdatas,
        }
    }
}

impl From<ManagedZone> for HostedZone {
    fn from(zone: ManagedZone) -> Self {
        let private = zone.visibility.as_deref() == Some("private");
        let network_scopes = zone
            .private_visibility_config
            .map(|config| {
                config
                    .networks
                    .into_iter()
                    .map(|network| network.network_url)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id: zone.name,
            dns_name: zone.dns_name,
            private,
            network_scopes,
        }
    }
}

/// Derive a managed zone resource name from a DNS name.
///
/// Resource names must match `[a-z][-a-z0-9]{0,62}`; `cluster-test.local.` becomes
/// `cluster-test-local`.
#[must_use]
pub fn managed_zone_name(dns_name: &str) -> String {
    let mut name: String = dns_name
        .trim_end_matches('.')
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    name = name.trim_matches('-').to_string();
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        name.insert_str(0, "z-");
    }
    name.truncate(63);
    name.trim_end_matches('-').to_string()
}

/// Map a non-success HTTP status to an [`AuthorityError`].
#[must_use]
pub fn status_error(status: StatusCode, message: String) -> AuthorityError {
    match status {
        StatusCode::NOT_FOUND => AuthorityError::NotFound { what: message },
        StatusCode::CONFLICT => AuthorityError::AlreadyExists { what: message },
        s if is_retryable_http_status(s) => AuthorityError::Unavailable {
            status: s.as_u16(),
            message,
        },
        s => AuthorityError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}

/// [`DnsAuthority`] backed by the Cloud DNS v1 REST API.
#[derive(Debug)]
pub struct CloudDnsAuthority {
    http: HttpClient,
    base: Url,
    project: String,
    credentials: Credentials,
    token: Mutex<Option<CachedToken>>,
}

impl CloudDnsAuthority {
    /// Build an adapter from its connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Transport`] if the endpoint is not a usable base URL or the
    /// HTTP client cannot be built.
    pub fn new(config: CloudDnsConfig) -> Result<Self, AuthorityError> {
        let base = Url::parse(config.endpoint.trim_end_matches('/')).map_err(|e| {
            AuthorityError::Transport(format!("invalid endpoint '{}': {e}", config.endpoint))
        })?;
        if base.cannot_be_a_base() {
            return Err(AuthorityError::Transport(format!(
                "endpoint '{}' cannot be used as a base URL",
                config.endpoint
            )));
        }
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthorityError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            project: config.project,
            credentials: config.credentials,
            token: Mutex::new(None),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, AuthorityError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| AuthorityError::Transport(format!("invalid base URL {}", self.base)))?
            .pop_if_empty()
            .extend(["projects", self.project.as_str()])
            .extend(segments);
        Ok(url)
    }

    async fn bearer_token(&self) -> Result<Option<String>, AuthorityError> {
        match &self.credentials {
            Credentials::Anonymous => Ok(None),
            Credentials::Static(token) => Ok(Some(token.clone())),
            Credentials::Metadata(metadata) => {
                let mut cached = self.token.lock().await;
                if let Some(token) = cached.as_ref() {
                    if Instant::now() < token.refresh_at {
                        return Ok(Some(token.token.clone()));
                    }
                }
                let fresh = metadata
                    .access_token()
                    .await
                    .map_err(|e| AuthorityError::Credentials(e.to_string()))?;
                let lifetime = fresh
                    .expires_in
                    .saturating_sub(Duration::from_secs(ACCESS_TOKEN_REFRESH_MARGIN_SECS));
                debug!(
                    valid_for = ?lifetime,
                    "Fetched Cloud DNS access token from metadata server"
                );
                *cached = Some(CachedToken {
                    token: fresh.token.clone(),
                    refresh_at: Instant::now() + lifetime,
                });
                Ok(Some(fresh.token))
            }
        }
    }

    /// Execute a request with retry according to `policy`.
    async fn request<T, B>(
        &self,
        operation: &'static str,
        method: Method,
        url: &Url,
        body: Option<&B>,
        policy: RetryPolicy,
    ) -> Result<T, AuthorityError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let mut backoff = http_backoff();
        let started = Instant::now();
        let mut attempt = 0_u32;

        loop {
            attempt += 1;
            let result = self.request_once(method.clone(), url, body).await;
            metrics::record_authority_request(operation, result.is_ok());

            let err = match result {
                Ok(text) => {
                    if attempt > 1 {
                        debug!(
                            operation,
                            attempt,
                            elapsed = ?started.elapsed(),
                            "Cloud DNS request recovered"
                        );
                    }
                    return serde_json::from_str(&text)
                        .map_err(|e| AuthorityError::Decode(format!("{operation}: {e}")));
                }
                Err(err) => err,
            };

            if !policy.allows(&err) {
                return Err(err);
            }
            let Some(delay) = backoff.next_backoff() else {
                error!(
                    operation,
                    attempt,
                    elapsed = ?started.elapsed(),
                    error = %err,
                    "Giving up on Cloud DNS request"
                );
                return Err(err);
            };
            warn!(
                operation,
                attempt,
                retry_in = ?delay,
                error = %err,
                "Cloud DNS request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn request_once<B: Serialize + Sync>(
        &self,
        method: Method,
        url: &Url,
        body: Option<&B>,
    ) -> Result<String, AuthorityError> {
        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(token) = self.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthorityError::Transport(format!("{method} {url}: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthorityError::Transport(format!("{method} {url}: {e}")))?;

        if !status.is_success() {
            debug!(method = %method, url = %url, status = %status, "Cloud DNS request failed");
            return Err(status_error(status, error_message(&text)));
        }
        Ok(text)
    }
}

#[async_trait]
impl DnsAuthority for CloudDnsAuthority {
    async fn find_zones(&self, dns_name: &str) -> Result<Vec<HostedZone>, AuthorityError> {
        let mut zones = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.url(&["managedZones"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("dnsName", dns_name);
                if let Some(token) = page_token.as_deref() {
                    query.append_pair("pageToken", token);
                }
            }
            let page: ManagedZonesPage = self
                .request(
                    "find_zones",
                    Method::GET,
                    &url,
                    None::<&()>,
                    RetryPolicy::Transient,
                )
                .await?;

            zones.extend(
                page.managed_zones
                    .into_iter()
                    .filter(|zone| zone.dns_name.eq_ignore_ascii_case(dns_name))
                    .map(HostedZone::from),
            );
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(zones)
    }

    async fn create_private_zone(
        &self,
        request: &CreateZoneRequest,
    ) -> Result<HostedZone, AuthorityError> {
        let mut url = self.url(&["managedZones"])?;
        url.query_pairs_mut()
            .append_pair("clientOperationId", &request.creation_token);

        let body = ManagedZone {
            id: None,
            name: managed_zone_name(&request.dns_name),
            dns_name: request.dns_name.clone(),
            description: request.description.clone(),
            visibility: Some("private".to_string()),
            private_visibility_config: Some(PrivateVisibilityConfig {
                networks: vec![NetworkRef {
                    network_url: request.network_scope.clone(),
                }],
            }),
        };

        let created: ManagedZone = self
            .request(
                "create_zone",
                Method::POST,
                &url,
                Some(&body),
                RetryPolicy::Transient,
            )
            .await?;
        Ok(created.into())
    }

    async fn list_records(
        &self,
        zone: &ZoneHandle,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<RecordPage, AuthorityError> {
        let mut url = self.url(&["managedZones", zone.id.as_str(), "rrsets"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("maxResults", &page_size.to_string());
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }

        let page: ResourceRecordSetsPage = self
            .request(
                "list_records",
                Method::GET,
                &url,
                None::<&()>,
                RetryPolicy::Transient,
            )
            .await?;

        Ok(RecordPage {
            records: page.rrsets.into_iter().map(RawRecordSet::from).collect(),
            next_page_token: page.next_page_token.filter(|token| !token.is_empty()),
        })
    }

    async fn submit_changes(
        &self,
        zone: &ZoneHandle,
        batch: &ChangeBatch,
    ) -> Result<ChangeReceipt, AuthorityError> {
        let url = self.url(&["managedZones", zone.id.as_str(), "changes"])?;
        let body = Change {
            additions: batch.additions().into_iter().map(Into::into).collect(),
            deletions: batch.deletions().into_iter().map(Into::into).collect(),
            id: None,
            status: None,
        };

        let change: Change = self
            .request(
                "submit_changes",
                Method::POST,
                &url,
                Some(&body),
                RetryPolicy::RateLimitOnly,
            )
            .await?;

        Ok(ChangeReceipt {
            id: change.id.unwrap_or_default(),
            status: change.status.unwrap_or_else(|| "pending".to_string()),
        })
    }
}

#[cfg(test)]
#[path = "cloud_dns_tests.rs"]
mod cloud_dns_tests;
