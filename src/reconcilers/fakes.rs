// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory collaborators for reconciler unit tests.

use crate::client::{ObjectCache, TriggerApi};
use crate::crd::Trigger;
use async_trait::async_trait;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Build a `kube::Error::Api` with the given HTTP status code.
pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(Box::new(kube::error::ErrorResponse {
        status: Some(kube::core::response::StatusSummary::Failure),
        metadata: None,
        details: None,
        message: format!("injected {reason}"),
        reason: reason.to_string(),
        code,
    }))
}

/// [`ObjectCache`] over a map keyed by `(namespace, name)`.
pub struct FakeCache<K> {
    objects: Mutex<HashMap<(Option<String>, String), Arc<K>>>,
    fail_with: Mutex<Option<u16>>,
}

impl<K> Default for FakeCache<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_with: Mutex::new(None),
        }
    }
}

impl<K: ResourceExt> FakeCache<K> {
    pub fn with(objects: Vec<K>) -> Self {
        let cache = Self::default();
        for object in objects {
            cache.insert(object);
        }
        cache
    }

    pub fn insert(&self, object: K) {
        let key = (object.namespace(), object.name_any());
        self.objects.lock().unwrap().insert(key, Arc::new(object));
    }

    /// Make every subsequent `get` fail with `code`.
    pub fn fail_with(&self, code: u16) {
        *self.fail_with.lock().unwrap() = Some(code);
    }

    /// The cached entry, to check it was never mutated.
    pub fn cached(&self, namespace: Option<&str>, name: &str) -> Option<Arc<K>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.map(str::to_string), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl<K: Send + Sync> ObjectCache<K> for FakeCache<K> {
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<Arc<K>>, kube::Error> {
        if let Some(code) = *self.fail_with.lock().unwrap() {
            return Err(api_error(code, "InternalError"));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&(namespace.map(str::to_string), name.to_string()))
            .cloned())
    }
}

/// [`TriggerApi`] storing triggers in memory and counting calls.
#[derive(Default)]
pub struct FakeTriggerApi {
    triggers: Mutex<Vec<Trigger>>,
    next_suffix: Mutex<u32>,
    fail_create_after: Mutex<Option<usize>>,
    fail_delete: Mutex<HashSet<String>>,
    pub lists: Mutex<usize>,
    pub creates: Mutex<Vec<Trigger>>,
    pub deletes: Mutex<Vec<String>>,
}

impl FakeTriggerApi {
    pub fn with(triggers: Vec<Trigger>) -> Self {
        let api = Self::default();
        *api.next_suffix.lock().unwrap() = u32::try_from(triggers.len()).unwrap() + 100;
        *api.triggers.lock().unwrap() = triggers;
        api
    }

    /// Let `successes` creations succeed, then fail every further one.
    pub fn fail_create_after(&self, successes: usize) {
        *self.fail_create_after.lock().unwrap() = Some(successes);
    }

    /// Fail deletion of the trigger named `name`.
    pub fn fail_delete(&self, name: &str) {
        self.fail_delete.lock().unwrap().insert(name.to_string());
    }

    pub fn stored(&self) -> Vec<Trigger> {
        self.triggers.lock().unwrap().clone()
    }

    pub fn create_count(&self) -> usize {
        self.creates.lock().unwrap().len()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }

    pub fn call_count(&self) -> usize {
        *self.lists.lock().unwrap() + self.create_count() + self.delete_count()
    }
}

#[async_trait]
impl TriggerApi for FakeTriggerApi {
    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Trigger>, kube::Error> {
        *self.lists.lock().unwrap() += 1;
        Ok(self
            .triggers
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.namespace().as_deref() == Some(namespace))
            .filter(|t| labels.iter().all(|(k, v)| t.labels().get(k) == Some(v)))
            .cloned()
            .collect())
    }

    async fn create(&self, namespace: &str, trigger: &Trigger) -> Result<Trigger, kube::Error> {
        let mut creates = self.creates.lock().unwrap();
        if let Some(limit) = *self.fail_create_after.lock().unwrap() {
            if creates.len() >= limit {
                return Err(api_error(500, "InternalError"));
            }
        }
        creates.push(trigger.clone());

        let mut suffix = self.next_suffix.lock().unwrap();
        *suffix += 1;
        let mut stored = trigger.clone();
        stored.metadata.name = Some(format!(
            "{}{:05}",
            trigger.metadata.generate_name.clone().unwrap_or_default(),
            *suffix
        ));
        stored.metadata.namespace = Some(namespace.to_string());
        self.triggers.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        self.deletes.lock().unwrap().push(name.to_string());
        if self.fail_delete.lock().unwrap().contains(name) {
            return Err(api_error(500, "InternalError"));
        }
        self.triggers
            .lock()
            .unwrap()
            .retain(|t| !(t.namespace().as_deref() == Some(namespace) && t.name_any() == name));
        Ok(())
    }
}
