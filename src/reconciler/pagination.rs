// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pagination helpers for Kubernetes API list operations.
//!
//! Cluster-wide pod lists get large; fetching them in pages keeps memory use and API server
//! load bounded. Each page request is retried on its own, so a transient failure late in a
//! long listing does not restart it from the first page.

use crate::constants::KUBE_LIST_PAGE_SIZE;
use crate::reconciler::retry::retry_kube_call;
use anyhow::Result;
use kube::{api::ListParams, Api, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Collect every object matched by `list_params`, one page of [`KUBE_LIST_PAGE_SIZE`] at
/// a time, following the API server's `continue` tokens.
///
/// ```no_run
/// use k8s_openapi::api::core::v1::Service;
/// use kube::{api::ListParams, Api, Client};
/// use clusterzone::reconciler::pagination::list_all_paginated;
///
/// # async fn example() -> anyhow::Result<()> {
/// let services: Api<Service> = Api::all(Client::try_default().await?);
/// let all = list_all_paginated(&services, ListParams::default()).await?;
/// println!("{} services", all.len());
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if a page cannot be fetched within the Kubernetes API retry budget.
pub async fn list_all_paginated<K>(api: &Api<K>, list_params: ListParams) -> Result<Vec<K>>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let plural = K::plural(&());
    let mut params = list_params.limit(KUBE_LIST_PAGE_SIZE);
    let mut items = Vec::new();
    let mut pages = 0_usize;

    loop {
        pages += 1;
        let page = retry_kube_call(
            || {
                let params = params.clone();
                async move { api.list(&params).await }
            },
            &format!("list {plural} page {pages}"),
        )
        .await?;

        let fetched = page.items.len();
        items.extend(page.items);
        debug!(resource = %plural, page = pages, fetched, total = items.len(), "Listed page");

        match page.metadata.continue_.filter(|token| !token.is_empty()) {
            Some(token) => params.continue_token = Some(token),
            None => break,
        }
    }

    debug!(resource = %plural, pages, total = items.len(), "Finished paginated list");
    Ok(items)
}

#[cfg(test)]
#[path = "pagination_tests.rs"]
mod pagination_tests;
