// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Paged list calls.
//!
//! Trigger lists are read in pages of [`KUBE_LIST_PAGE_SIZE`], following the API
//! server's `continue` token until it runs out.

use crate::constants::KUBE_LIST_PAGE_SIZE;
use kube::{api::ListParams, Api, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Apply the page size to `list_params`, keeping any caller-supplied limit.
#[must_use]
pub fn paged(mut list_params: ListParams) -> ListParams {
    if list_params.limit.is_none() {
        list_params.limit = Some(KUBE_LIST_PAGE_SIZE);
    }
    list_params
}

/// The token to request the next page with, or `None` on the last page.
///
/// The API server reports the last page with either no token or an empty one.
#[must_use]
pub fn next_page_token(continue_token: Option<String>) -> Option<String> {
    continue_token.filter(|token| !token.is_empty())
}

/// List every object matching `list_params`, one page at a time.
///
/// Items come back in API server order.
///
/// ```no_run
/// use kube::{Api, Client, api::ListParams};
/// use autotrigger::crd::Trigger;
/// use autotrigger::reconcilers::pagination::list_all_paginated;
///
/// # async fn example() -> Result<(), kube::Error> {
/// let client = Client::try_default().await?;
/// let api: Api<Trigger> = Api::namespaced(client, "default");
///
/// let triggers = list_all_paginated(&api, ListParams::default().labels("app=demo")).await?;
/// println!("Found {} triggers", triggers.len());
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns the first API error; items from earlier pages are discarded.
pub async fn list_all_paginated<K>(api: &Api<K>, list_params: ListParams) -> Result<Vec<K>, kube::Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let mut list_params = paged(list_params);
    let mut items = Vec::new();
    let mut pages = 0_u32;

    loop {
        let page = api.list(&list_params).await?;
        pages += 1;
        items.extend(page.items);

        match next_page_token(page.metadata.continue_) {
            Some(token) => list_params.continue_token = Some(token),
            None => break,
        }
    }

    debug!(pages = pages, items = items.len(), "Listed all pages");
    Ok(items)
}

#[cfg(test)]
#[path = "pagination_tests.rs"]
mod pagination_tests;
