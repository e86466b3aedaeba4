// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zone bootstrapper.
//!
//! Resolves the private zone once per process:
//!
//! 1. Determine the network scope. Failure aborts the cycle.
//! 2. Adopt an existing private zone with the configured name that is bound to that scope.
//! 3. Otherwise create one, with a creation token that makes a repeated request a no-op.
//! 4. If creation reports the zone as already existing (another instance won the race),
//!    look it up once more and adopt it.
//!
//! The resolved [`ZoneHandle`] is cached behind a [`OnceCell`]; failures are not cached, so
//! the next cycle starts over.

use crate::authority::{CreateZoneRequest, DnsAuthority, HostedZone};
use crate::constants::{CREATION_TOKEN_PREFIX, ZONE_DESCRIPTION};
use crate::errors::{AuthorityError, ProvisioningError};
use crate::metadata::NetworkScopeResolver;
use crate::record::ZoneHandle;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

static LAST_TOKEN_NANOS: AtomicI64 = AtomicI64::new(0);

/// Build a creation token for `zone`.
///
/// Tokens are derived from the wall clock in nanoseconds and strictly increase within a
/// process, so two bootstraps never share one.
#[must_use]
pub fn creation_token(zone: &str) -> String {
    let now = Utc::now();
    let clock = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000));
    let previous = LAST_TOKEN_NANOS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(clock.max(last.saturating_add(1)))
        })
        .unwrap_or(clock);
    let nanos = clock.max(previous.saturating_add(1));
    format!(
        "{CREATION_TOKEN_PREFIX}-{}-{nanos}",
        zone.trim_end_matches('.')
    )
}

/// Write-once resolver of the zone handle.
pub struct ZoneBootstrapper {
    zone_name: String,
    authority: Arc<dyn DnsAuthority>,
    scope: Arc<dyn NetworkScopeResolver>,
    handle: OnceCell<ZoneHandle>,
}

impl ZoneBootstrapper {
    /// Create a bootstrapper for the zone `zone_name` (trailing-dot form).
    pub fn new(
        zone_name: impl Into<String>,
        authority: Arc<dyn DnsAuthority>,
        scope: Arc<dyn NetworkScopeResolver>,
    ) -> Self {
        Self {
            zone_name: zone_name.into(),
            authority,
            scope,
            handle: OnceCell::new(),
        }
    }

    /// The zone handle, if it has been resolved already.
    #[must_use]
    pub fn cached(&self) -> Option<&ZoneHandle> {
        self.handle.get()
    }

    /// Return the zone handle, resolving or creating the zone on first use.
    ///
    /// # Errors
    ///
    /// Returns a [`ProvisioningError`] if the network scope cannot be determined or the
    /// authority cannot look up or create the zone.
    pub async fn ensure_zone(&self) -> Result<ZoneHandle, ProvisioningError> {
        self.handle
            .get_or_try_init(|| self.resolve())
            .await
            .cloned()
    }

    async fn resolve(&self) -> Result<ZoneHandle, ProvisioningError> {
        let scope = self
            .scope
            .resolve_network_scope()
            .await
            .map_err(|source| ProvisioningError::NetworkScope {
                zone: self.zone_name.clone(),
                source,
            })?;
        debug!(zone = %self.zone_name, scope = %scope, "Resolved network scope");

        if let Some(handle) = self.adopt(&scope).await? {
            info!(zone = %handle, scope = %scope, "Adopted existing private zone");
            return Ok(handle);
        }

        let request = CreateZoneRequest {
            dns_name: self.zone_name.clone(),
            network_scope: scope.clone(),
            creation_token: creation_token(&self.zone_name),
            description: ZONE_DESCRIPTION.to_string(),
        };
        info!(
            zone = %self.zone_name,
            scope = %scope,
            token = %request.creation_token,
            "Creating private zone"
        );

        match self.authority.create_private_zone(&request).await {
            Ok(created) => {
                let handle = zone_handle(created, &scope);
                info!(zone = %handle, "Created private zone");
                Ok(handle)
            }
            Err(AuthorityError::AlreadyExists { what }) => {
                warn!(
                    zone = %self.zone_name,
                    conflict = %what,
                    "Zone created concurrently, looking it up again"
                );
                self.adopt(&scope)
                    .await?
                    .ok_or_else(|| ProvisioningError::Vanished {
                        zone: self.zone_name.clone(),
                        scope: scope.clone(),
                    })
            }
            Err(source) => Err(ProvisioningError::Create {
                zone: self.zone_name.clone(),
                source,
            }),
        }
    }

    /// Find a private zone with the configured name bound to `scope`.
    async fn adopt(&self, scope: &str) -> Result<Option<ZoneHandle>, ProvisioningError> {
        let zones = match self.authority.find_zones(&self.zone_name).await {
            Ok(zones) => zones,
            Err(AuthorityError::NotFound { .. }) => Vec::new(),
            Err(source) => {
                return Err(ProvisioningError::Lookup {
                    zone: self.zone_name.clone(),
                    source,
                })
            }
        };

        let mut adopted = None;
        for zone in zones {
            if !zone.dns_name.eq_ignore_ascii_case(&self.zone_name) {
                continue;
            }
            if adopted.is_none() && zone.is_private_to(scope) {
                adopted = Some(zone_handle(zone, scope));
            } else if !zone.is_private_to(scope) {
                warn!(
                    zone = %zone.dns_name,
                    id = %zone.id,
                    private = zone.private,
                    bound_to = ?zone.network_scopes,
                    "Skipping zone with matching name that is not private to this network"
                );
            }
        }
        Ok(adopted)
    }
}

fn zone_handle(zone: HostedZone, scope: &str) -> ZoneHandle {
    ZoneHandle {
        id: zone.id,
        name: zone.dns_name,
        network_scope_id: scope.to_string(),
    }
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod bootstrap_tests;
