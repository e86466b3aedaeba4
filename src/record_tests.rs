// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the record model.

#[cfg(test)]
mod tests {
    use crate::record::*;
    use std::net::IpAddr;

    #[test]
    fn test_kind_follows_address_family() {
        let v4: IpAddr = "10.0.0.1".parse().unwrap();
        let v6: IpAddr = "fd00::1".parse().unwrap();

        assert_eq!(RecordKind::for_address(&v4), RecordKind::A);
        assert_eq!(RecordKind::for_address(&v6), RecordKind::Aaaa);
        assert_eq!(RecordKind::Aaaa.to_string(), "AAAA");
    }

    #[test]
    fn test_only_address_kinds_are_managed() {
        assert_eq!(RecordKind::from_record_type("A"), Some(RecordKind::A));
        assert_eq!(RecordKind::from_record_type("AAAA"), Some(RecordKind::Aaaa));
        assert_eq!(RecordKind::from_record_type("SOA"), None);
        assert_eq!(RecordKind::from_record_type("NS"), None);
        assert_eq!(RecordKind::from_record_type("TXT"), None);
    }

    #[test]
    fn test_value_order_does_not_affect_equality() {
        let first = Record::new("web.ns.svc.zone.", RecordKind::A, 60, ["10.0.0.1", "10.0.0.2"]);
        let second = Record::new("web.ns.svc.zone.", RecordKind::A, 60, ["10.0.0.2", "10.0.0.1"]);

        assert!(first.same_content(&second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_ttl_and_kind_are_compared() {
        let base = Record::new("a.zone.", RecordKind::A, 60, ["10.0.0.1"]);
        let other_ttl = Record::new("a.zone.", RecordKind::A, 300, ["10.0.0.1"]);
        let other_values = Record::new("a.zone.", RecordKind::A, 60, ["10.0.0.2"]);

        assert!(!base.same_content(&other_ttl));
        assert!(!base.same_content(&other_values));
    }

    #[test]
    fn test_ipv6_values_are_canonicalised() {
        let expanded = Record::new("a.zone.", RecordKind::Aaaa, 60, ["2001:0db8:0000::0001"]);
        let compact = Record::new("a.zone.", RecordKind::Aaaa, 60, ["2001:db8::1"]);

        assert!(expanded.same_content(&compact));
        assert_eq!(expanded.values().collect::<Vec<_>>(), vec!["2001:db8::1"]);
    }

    #[test]
    fn test_non_address_values_kept_verbatim() {
        let record = Record::new("a.zone.", RecordKind::A, 60, [" not-an-ip "]);

        assert_eq!(record.values().collect::<Vec<_>>(), vec!["not-an-ip"]);
    }

    #[test]
    fn test_duplicate_values_collapse() {
        let record = Record::new("a.zone.", RecordKind::A, 60, ["10.0.0.1", "10.0.0.1"]);

        assert_eq!(record.values.len(), 1);
    }

    #[test]
    fn test_change_weight() {
        let desired = Record::new("a.zone.", RecordKind::A, 60, ["10.0.0.2"]);
        let observed = Record::new("a.zone.", RecordKind::A, 60, ["10.0.0.1"]);

        assert_eq!(ChangeItem::upsert(desired.clone(), None).weight(), 1);
        assert_eq!(ChangeItem::upsert(desired.clone(), Some(observed.clone())).weight(), 2);
        assert_eq!(ChangeItem::delete(observed.clone()).weight(), 1);

        let extra = Record::new("a.zone.", RecordKind::Aaaa, 60, ["fd00::1"]);
        assert_eq!(
            ChangeItem::upsert(desired.clone(), Some(observed.clone()))
                .with_shadowed(vec![extra.clone()])
                .weight(),
            3
        );
        assert_eq!(ChangeItem::delete(observed).with_shadowed(vec![extra]).weight(), 2);
    }

    #[test]
    fn test_observed_set_shadows_later_kinds() {
        let a = Record::new("a.zone.", RecordKind::A, 60, ["10.0.0.1"]);
        let aaaa = Record::new("a.zone.", RecordKind::Aaaa, 60, ["fd00::1"]);

        let mut observed = ObservedSet::new();
        assert!(observed.insert(a.clone()));
        assert!(!observed.insert(aaaa.clone()));

        assert_eq!(observed.len(), 1);
        assert_eq!(observed.record_set_count(), 2);
        assert_eq!(observed["a.zone."], a);
        assert_eq!(observed.shadowed("a.zone."), &[aaaa][..]);
    }

    #[test]
    fn test_describe_records() {
        let mut records = RecordSet::new();
        records.insert(
            "a.zone.".to_string(),
            Record::new("a.zone.", RecordKind::A, 60, ["10.0.0.1"]),
        );

        assert_eq!(describe_records(&records), "a.zone. -> 10.0.0.1");
    }
}
