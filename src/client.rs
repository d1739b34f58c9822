// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Seams between the reconcilers and the Kubernetes API.
//!
//! Reconcilers read parents and type definitions through [`ObjectCache`] and write
//! triggers through [`TriggerApi`]. Production code backs them with a controller's
//! reflector [`Store`] and a [`kube::Api`]; tests back them with in-memory fakes.

use crate::constants::FIELD_MANAGER;
use crate::crd::Trigger;
use crate::errors::is_not_found;
use crate::labels::selector_from_labels;
use crate::reconcilers::pagination::list_all_paginated;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Client, Resource};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

/// Read-through cache of objects delivered by the watch substrate.
#[async_trait]
pub trait ObjectCache<K>: Send + Sync {
    /// Get an object by namespace (`None` for cluster-scoped) and name.
    ///
    /// `Ok(None)` means the object does not exist. Returned objects are shared with the
    /// cache and must be cloned before any mutation.
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<Arc<K>>, kube::Error>;
}

/// [`ObjectCache`] backed by a reflector store.
#[derive(Clone)]
pub struct StoreCache<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    store: Store<K>,
    dyntype: K::DynamicType,
}

impl<K> StoreCache<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    #[must_use]
    pub fn new(store: Store<K>, dyntype: K::DynamicType) -> Self {
        Self { store, dyntype }
    }
}

#[async_trait]
impl<K> ObjectCache<K> for StoreCache<K>
where
    K: Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Eq + Hash + Clone + Send + Sync,
{
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<Arc<K>>, kube::Error> {
        let mut object_ref = ObjectRef::<K>::new_with(name, self.dyntype.clone());
        if let Some(namespace) = namespace {
            object_ref = object_ref.within(namespace);
        }
        Ok(self.store.get(&object_ref))
    }
}

/// Create, list, and delete operations for [`Trigger`]s.
#[async_trait]
pub trait TriggerApi: Send + Sync {
    /// List triggers in `namespace` carrying every label in `labels`.
    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Trigger>, kube::Error>;

    /// Create `trigger` in `namespace`, returning the stored object.
    async fn create(&self, namespace: &str, trigger: &Trigger) -> Result<Trigger, kube::Error>;

    /// Delete the trigger `name` in `namespace`. Deleting a missing trigger succeeds.
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;
}

/// [`TriggerApi`] talking to the Kubernetes API server.
#[derive(Clone)]
pub struct KubeTriggerApi {
    client: Client,
}

impl KubeTriggerApi {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Trigger> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl Debug for KubeTriggerApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeTriggerApi").finish_non_exhaustive()
    }
}

#[async_trait]
impl TriggerApi for KubeTriggerApi {
    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Trigger>, kube::Error> {
        let mut params = ListParams::default();
        if !labels.is_empty() {
            params = params.labels(&selector_from_labels(labels));
        }
        list_all_paginated(&self.api(namespace), params).await
    }

    async fn create(&self, namespace: &str, trigger: &Trigger) -> Result<Trigger, kube::Error> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api(namespace).create(&params, trigger).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        match self.api(namespace).delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!(namespace = namespace, trigger = name, "Trigger already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
