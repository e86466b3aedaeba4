// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `bootstrap.rs`

#[cfg(test)]
mod tests {
    use super::super::{creation_token, ZoneBootstrapper};
    use crate::authority::memory::{AuthorityOperation, InMemoryAuthority};
    use crate::authority::{
        ChangeBatch, ChangeReceipt, CreateZoneRequest, DnsAuthority, HostedZone, RecordPage,
    };
    use crate::errors::{AuthorityError, MetadataError, ProvisioningError};
    use crate::metadata::{NetworkScopeResolver, StaticNetworkScope};
    use crate::record::ZoneHandle;
    use async_trait::async_trait;
    use std::sync::Arc;

    const ZONE: &str = "cluster-test.local.";
    const SCOPE: &str = "projects/acme/global/networks/default";

    struct NoScope;

    #[async_trait]
    impl NetworkScopeResolver for NoScope {
        async fn resolve_network_scope(&self) -> Result<String, MetadataError> {
            Err(MetadataError::Unavailable {
                path: "instance/network-interfaces/0/network".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    /// Another instance creates the zone between our lookup and our create.
    struct RacingAuthority(Arc<InMemoryAuthority>);

    #[async_trait]
    impl DnsAuthority for RacingAuthority {
        async fn find_zones(&self, dns_name: &str) -> Result<Vec<HostedZone>, AuthorityError> {
            self.0.find_zones(dns_name).await
        }

        async fn create_private_zone(
            &self,
            request: &CreateZoneRequest,
        ) -> Result<HostedZone, AuthorityError> {
            let rival = CreateZoneRequest {
                creation_token: "rival".to_string(),
                ..request.clone()
            };
            self.0.create_private_zone(&rival).await?;
            self.0.create_private_zone(request).await
        }

        async fn list_records(
            &self,
            zone: &ZoneHandle,
            page_token: Option<&str>,
            page_size: u32,
        ) -> Result<RecordPage, AuthorityError> {
            self.0.list_records(zone, page_token, page_size).await
        }

        async fn submit_changes(
            &self,
            zone: &ZoneHandle,
            batch: &ChangeBatch,
        ) -> Result<ChangeReceipt, AuthorityError> {
            self.0.submit_changes(zone, batch).await
        }
    }

    fn bootstrapper(authority: Arc<dyn DnsAuthority>) -> ZoneBootstrapper {
        ZoneBootstrapper::new(
            ZONE,
            authority,
            Arc::new(StaticNetworkScope(SCOPE.to_string())),
        )
    }

    fn existing(id: &str, private: bool, scope: &str) -> HostedZone {
        HostedZone {
            id: id.to_string(),
            dns_name: ZONE.to_string(),
            private,
            network_scopes: vec![scope.to_string()],
        }
    }

    #[test]
    fn test_creation_tokens_are_unique() {
        let first = creation_token(ZONE);
        let second = creation_token(ZONE);

        assert!(first.starts_with("clusterzone-cluster-test.local-"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_creates_zone_once_and_caches_handle() {
        let authority = Arc::new(InMemoryAuthority::new());
        let bootstrapper = bootstrapper(authority.clone());

        let first = bootstrapper.ensure_zone().await.unwrap();
        let second = bootstrapper.ensure_zone().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.name, ZONE);
        assert_eq!(first.network_scope_id, SCOPE);
        assert_eq!(bootstrapper.cached(), Some(&first));
        assert_eq!(authority.calls(AuthorityOperation::FindZones), 1);
        assert_eq!(authority.calls(AuthorityOperation::CreateZone), 1);
        assert_eq!(authority.zones().len(), 1);
    }

    #[tokio::test]
    async fn test_adopts_existing_private_zone() {
        let authority = Arc::new(InMemoryAuthority::new());
        authority.insert_zone(existing("existing", true, SCOPE));

        let handle = bootstrapper(authority.clone()).ensure_zone().await.unwrap();

        assert_eq!(handle.id, "existing");
        assert_eq!(authority.calls(AuthorityOperation::CreateZone), 0);
    }

    #[tokio::test]
    async fn test_skips_zones_not_private_to_scope() {
        let authority = Arc::new(InMemoryAuthority::new());
        authority.insert_zone(existing("public", false, SCOPE));
        authority.insert_zone(existing(
            "elsewhere",
            true,
            "projects/acme/global/networks/other",
        ));

        let handle = bootstrapper(authority.clone()).ensure_zone().await.unwrap();

        assert_ne!(handle.id, "public");
        assert_ne!(handle.id, "elsewhere");
        assert_eq!(authority.calls(AuthorityOperation::CreateZone), 1);
    }

    #[tokio::test]
    async fn test_missing_scope_is_fatal() {
        let authority = Arc::new(InMemoryAuthority::new());
        let bootstrapper = ZoneBootstrapper::new(ZONE, authority.clone(), Arc::new(NoScope));

        let result = bootstrapper.ensure_zone().await;

        assert!(matches!(result, Err(ProvisioningError::NetworkScope { .. })));
        assert_eq!(authority.calls(AuthorityOperation::FindZones), 0);
        assert!(bootstrapper.cached().is_none());
    }

    #[tokio::test]
    async fn test_adopts_zone_created_concurrently() {
        let inner = Arc::new(InMemoryAuthority::new());
        let bootstrapper = bootstrapper(Arc::new(RacingAuthority(inner.clone())));

        let handle = bootstrapper.ensure_zone().await.unwrap();

        assert_eq!(inner.zones().len(), 1);
        assert_eq!(handle.id, inner.zones()[0].id);
        assert_eq!(inner.calls(AuthorityOperation::FindZones), 2);
    }

    #[tokio::test]
    async fn test_conflict_without_zone_is_vanished() {
        let authority = Arc::new(InMemoryAuthority::new());
        authority.fail_next(
            AuthorityOperation::CreateZone,
            AuthorityError::AlreadyExists {
                what: "private zone cluster-test.local.".to_string(),
            },
        );

        let result = bootstrapper(authority).ensure_zone().await;

        assert!(matches!(result, Err(ProvisioningError::Vanished { .. })));
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let authority = Arc::new(InMemoryAuthority::new());
        authority.fail_next(
            AuthorityOperation::FindZones,
            AuthorityError::Unavailable {
                status: 503,
                message: "backend unavailable".to_string(),
            },
        );
        let bootstrapper = bootstrapper(authority);

        let failed = bootstrapper.ensure_zone().await;
        let recovered = bootstrapper.ensure_zone().await;

        assert!(matches!(failed, Err(ProvisioningError::Lookup { .. })));
        assert!(recovered.is_ok());
    }

    #[tokio::test]
    async fn test_create_failure_is_reported() {
        let authority = Arc::new(InMemoryAuthority::new());
        authority.fail_next(
            AuthorityOperation::CreateZone,
            AuthorityError::Rejected {
                status: 403,
                message: "forbidden".to_string(),
            },
        );

        let result = bootstrapper(authority).ensure_zone().await;

        assert!(matches!(result, Err(ProvisioningError::Create { .. })));
    }
}
