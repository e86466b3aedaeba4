// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the in-memory authority.

#[cfg(test)]
mod tests {
    use crate::authority::memory::{AuthorityOperation, InMemoryAuthority};
    use crate::authority::{ChangeBatch, CreateZoneRequest, DnsAuthority};
    use crate::errors::AuthorityError;
    use crate::record::{ChangeItem, Record, RecordKind, ZoneHandle};

    const SCOPE: &str = "projects/acme/global/networks/default";

    fn request(token: &str) -> CreateZoneRequest {
        CreateZoneRequest {
            dns_name: "cluster-test.local.".to_string(),
            network_scope: SCOPE.to_string(),
            creation_token: token.to_string(),
            description: "test".to_string(),
        }
    }

    async fn created(authority: &InMemoryAuthority) -> ZoneHandle {
        let zone = authority.create_private_zone(&request("t1")).await.unwrap();
        ZoneHandle {
            id: zone.id,
            name: zone.dns_name,
            network_scope_id: SCOPE.to_string(),
        }
    }

    fn a(name: &str, ip: &str) -> Record {
        Record::new(name, RecordKind::A, 60, [ip])
    }

    #[tokio::test]
    async fn test_creation_token_is_idempotent() {
        let authority = InMemoryAuthority::new();

        let first = authority.create_private_zone(&request("t1")).await.unwrap();
        let again = authority.create_private_zone(&request("t1")).await.unwrap();
        let other = authority.create_private_zone(&request("t2")).await;

        assert_eq!(first, again);
        assert_eq!(authority.zones().len(), 1);
        assert!(matches!(other, Err(AuthorityError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_new_zone_holds_apex_records() {
        let authority = InMemoryAuthority::new();
        let zone = created(&authority).await;

        let types: Vec<String> = authority
            .records(&zone.id)
            .into_iter()
            .map(|r| r.record_type)
            .collect();
        assert_eq!(types, vec!["NS", "SOA"]);
    }

    #[tokio::test]
    async fn test_listing_is_paged() {
        let authority = InMemoryAuthority::new().with_max_page_size(2);
        let zone = created(&authority).await;
        for i in 1..=3 {
            let record = a(&format!("r{i}.cluster-test.local."), &format!("10.0.0.{i}"));
            authority.insert_record(&zone.id, (&record).into());
        }

        let first = authority.list_records(&zone, None, 100).await.unwrap();
        assert_eq!(first.records.len(), 2);
        let second = authority
            .list_records(&zone, first.next_page_token.as_deref(), 100)
            .await
            .unwrap();
        assert_eq!(second.records.len(), 2);
        let third = authority
            .list_records(&zone, second.next_page_token.as_deref(), 100)
            .await
            .unwrap();
        assert_eq!(third.records.len(), 1);
        assert!(third.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let authority = InMemoryAuthority::new();
        let zone = created(&authority).await;
        let before = authority.records(&zone.id);

        // The delete does not match anything held, so the addition must not land either.
        let batch = ChangeBatch {
            changes: vec![
                ChangeItem::upsert(a("new.cluster-test.local.", "10.0.0.1"), None),
                ChangeItem::delete(a("ghost.cluster-test.local.", "10.0.0.9")),
            ],
        };
        let result = authority.submit_changes(&zone, &batch).await;

        assert!(matches!(
            result,
            Err(AuthorityError::Rejected { status: 412, .. })
        ));
        assert_eq!(authority.records(&zone.id), before);
        assert!(authority.committed_batches().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_previous_record() {
        let authority = InMemoryAuthority::new();
        let zone = created(&authority).await;
        let old = a("web.ns.svc.cluster-test.local.", "10.0.0.1");
        authority.insert_record(&zone.id, (&old).into());

        let batch = ChangeBatch {
            changes: vec![ChangeItem::upsert(
                a("web.ns.svc.cluster-test.local.", "10.0.0.2"),
                Some(old),
            )],
        };
        authority.submit_changes(&zone, &batch).await.unwrap();

        let web: Vec<_> = authority
            .records(&zone.id)
            .into_iter()
            .filter(|r| r.name == "web.ns.svc.cluster-test.local.")
            .collect();
        assert_eq!(web.len(), 1);
        assert_eq!(web[0].values, vec!["10.0.0.2"]);
    }

    #[tokio::test]
    async fn test_oversized_and_empty_batches_are_rejected() {
        let authority = InMemoryAuthority::new().with_max_batch_weight(1);
        let zone = created(&authority).await;

        let oversized = ChangeBatch {
            changes: vec![
                ChangeItem::upsert(a("a.cluster-test.local.", "10.0.0.1"), None),
                ChangeItem::upsert(a("b.cluster-test.local.", "10.0.0.2"), None),
            ],
        };
        let empty = ChangeBatch::default();

        assert!(matches!(
            authority.submit_changes(&zone, &oversized).await,
            Err(AuthorityError::Rejected { status: 400, .. })
        ));
        assert!(matches!(
            authority.submit_changes(&zone, &empty).await,
            Err(AuthorityError::Rejected { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn test_injected_failure_hits_only_next_matching_call() {
        let authority = InMemoryAuthority::new();
        authority.fail_next(
            AuthorityOperation::FindZones,
            AuthorityError::Transport("connection reset".to_string()),
        );

        let failed = authority.find_zones("cluster-test.local.").await;
        let succeeded = authority.find_zones("cluster-test.local.").await;

        assert!(matches!(failed, Err(AuthorityError::Transport(_))));
        assert!(succeeded.unwrap().is_empty());
        assert_eq!(authority.calls(AuthorityOperation::FindZones), 2);
        assert_eq!(authority.calls(AuthorityOperation::CreateZone), 0);
    }

    #[tokio::test]
    async fn test_unknown_zone_is_not_found() {
        let authority = InMemoryAuthority::new();
        let zone = ZoneHandle {
            id: "missing".to_string(),
            name: "cluster-test.local.".to_string(),
            network_scope_id: SCOPE.to_string(),
        };

        assert!(matches!(
            authority.list_records(&zone, None, 10).await,
            Err(AuthorityError::NotFound { .. })
        ));
    }
}
