// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # clusterzone - private DNS for Kubernetes pods and services
//!
//! clusterzone keeps a private DNS zone in sync with the pods and services of a Kubernetes
//! cluster. Each cycle reads cluster membership, derives the records the zone should hold,
//! compares them with what the DNS authority holds and submits the difference.
//!
//! ## Modules
//!
//! - [`record`] - Record model, desired and observed sets, change lists
//! - [`authority`] - DNS authority abstraction with Cloud DNS and in-memory backends
//! - [`metadata`] - Network scope resolution from instance metadata
//! - [`cluster`] - Cluster observer backed by the Kubernetes API
//! - [`reconciler`] - Bootstrap, read, diff, apply and scheduling
//! - [`config`] - Command-line and environment configuration
//! - [`metrics`] and [`metrics_server`] - Prometheus metrics and health probes
//!
//! ## Record names
//!
//! | Source  | Name                                     | Kind         |
//! |---------|------------------------------------------|--------------|
//! | Pod     | `10-0-0-5.default.pod.cluster-test.local.` | `A` / `AAAA` |
//! | Service | `web.default.svc.cluster-test.local.`    | `A` / `AAAA` |
//!
//! ## Example
//!
//! ```rust,no_run
//! use clusterzone::record::{DesiredSet, ObservedSet, Record, RecordKind};
//! use clusterzone::reconciler::diff::diff;
//!
//! let mut desired = DesiredSet::new();
//! let record = Record::new("web.default.svc.cluster-test.local.", RecordKind::A, 60, ["10.96.0.10"]);
//! desired.insert(record.name.clone(), record);
//!
//! let changes = diff(&desired, &ObservedSet::new()).unwrap();
//! assert_eq!(changes.len(), 1);
//! ```

pub mod authority;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod errors;
pub mod metadata;
pub mod metrics;
pub mod metrics_server;
pub mod reconciler;
pub mod record;
