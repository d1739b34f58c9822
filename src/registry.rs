// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Registry of addressable resource types and their running controller loops.
//!
//! The registry is the single source of truth for maps that must change together:
//!
//! - loop key → [`RunningLoop`] (one per addressable type, keyed by the CRD name)
//! - [`GroupVersionKind`] → [`TypeCoordinates`] (consulted by the ownership-chain guard)
//!
//! Kinds are registered on behalf of a key. A kind stays registered while any key
//! still claims it, so a static loop and a CRD for the same type do not unregister
//! each other. All of this lives behind one [`std::sync::Mutex`] that is only held for
//! map access, never across an `.await`, so lookups from reconcilers block lifecycle
//! changes for at most one critical section.

use kube::api::ApiResource;
use kube::core::GroupVersionKind;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Concrete API coordinates of an addressable resource type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeCoordinates {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name used in API paths (e.g., `widgets`)
    pub plural: String,
}

impl TypeCoordinates {
    /// `group/version`, or just `version` for the core group.
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    #[must_use]
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    /// Dynamic type information for `Api<DynamicObject>` and controllers.
    #[must_use]
    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(&self.gvk(), &self.plural)
    }
}

impl fmt::Display for TypeCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}/{}", self.plural, self.group, self.version)
    }
}

/// Parse an owner reference's `apiVersion` and `kind` into a [`GroupVersionKind`].
#[must_use]
pub fn gvk_from_api_version(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}

/// Answers whether a kind belongs to a type with a running addressable controller.
pub trait AddressableInfo: Send + Sync {
    fn is_gvk_addressable(&self, gvk: &GroupVersionKind) -> bool;
}

/// A per-type reconciliation loop started by the lifecycle manager.
pub struct RunningLoop {
    /// Coordinates the loop's controller watches
    pub coordinates: TypeCoordinates,
    /// Cancels the loop's execution scope
    pub cancel: CancellationToken,
    /// The spawned loop task
    pub handle: JoinHandle<()>,
}

impl fmt::Debug for RunningLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningLoop")
            .field("coordinates", &self.coordinates)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Everything [`AddressableRegistry::unregister`] removed for one key.
#[derive(Debug, Default)]
pub struct Unregistered {
    /// The cancelled loop, if one ran under the key
    pub running: Option<RunningLoop>,
    /// Kinds the key had registered
    pub kinds: Vec<GroupVersionKind>,
}

impl Unregistered {
    /// Whether nothing was registered under the key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.running.is_none() && self.kinds.is_empty()
    }
}

/// Coordinates of a kind and the keys that registered it.
struct KindEntry {
    coordinates: TypeCoordinates,
    owners: BTreeSet<String>,
}

#[derive(Default)]
struct RegistryState {
    loops: HashMap<String, RunningLoop>,
    kinds: HashMap<GroupVersionKind, KindEntry>,
    /// Kinds registered by each key, with or without a loop
    owned: HashMap<String, Vec<GroupVersionKind>>,
}

impl RegistryState {
    /// Upsert `gvk` on behalf of `key`. Last write wins for the coordinates.
    fn register(&mut self, key: &str, gvk: GroupVersionKind, coordinates: TypeCoordinates) {
        let entry = self.kinds.entry(gvk.clone()).or_insert_with(|| KindEntry {
            coordinates: coordinates.clone(),
            owners: BTreeSet::new(),
        });
        entry.coordinates = coordinates;
        entry.owners.insert(key.to_string());

        let owned = self.owned.entry(key.to_string()).or_default();
        if !owned.contains(&gvk) {
            owned.push(gvk);
        }
    }

    /// Drop `key`'s claim on its kinds; a kind disappears once no key claims it.
    fn release(&mut self, key: &str) -> Vec<GroupVersionKind> {
        let released = self.owned.remove(key).unwrap_or_default();
        for gvk in &released {
            let unclaimed = self.kinds.get_mut(gvk).is_some_and(|entry| {
                entry.owners.remove(key);
                entry.owners.is_empty()
            });
            if unclaimed {
                self.kinds.remove(gvk);
            }
        }
        released
    }
}

/// Shared map of running loops and addressable kinds.
///
/// Passed explicitly (behind an `Arc`) to everything that needs it.
#[derive(Default)]
pub struct AddressableRegistry {
    state: Mutex<RegistryState>,
}

impl AddressableRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Every critical section leaves the maps consistent, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upsert a single kind mapping on behalf of `key`. Last write wins.
    pub fn register(&self, key: &str, gvk: GroupVersionKind, coordinates: TypeCoordinates) {
        self.lock().register(key, gvk, coordinates);
    }

    /// Register `kinds` under `key` without starting a loop.
    ///
    /// Returns `false` when `key` already holds registrations or a loop; nothing
    /// changes in that case.
    pub fn register_kinds(&self, key: &str, kinds: Vec<(GroupVersionKind, TypeCoordinates)>) -> bool {
        let mut state = self.lock();
        if state.owned.contains_key(key) || state.loops.contains_key(key) {
            return false;
        }
        for (gvk, coordinates) in kinds {
            state.register(key, gvk, coordinates);
        }
        true
    }

    /// Look up the coordinates registered for a kind.
    #[must_use]
    pub fn lookup(&self, gvk: &GroupVersionKind) -> Option<TypeCoordinates> {
        self.lock().kinds.get(gvk).map(|entry| entry.coordinates.clone())
    }

    #[must_use]
    pub fn is_running(&self, key: &str) -> bool {
        self.lock().loops.contains_key(key)
    }

    /// Keys of every running loop, sorted.
    #[must_use]
    pub fn running_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().loops.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Coordinates of the loop running under `key`.
    #[must_use]
    pub fn running_coordinates(&self, key: &str) -> Option<TypeCoordinates> {
        self.lock()
            .loops
            .get(key)
            .map(|running| running.coordinates.clone())
    }

    /// Register `kinds` and start a loop for `key` unless one already runs.
    ///
    /// The existence check, the kind registration, the `start` call and the loop insert
    /// happen in one critical section, so concurrent callers for the same key start at
    /// most one loop. `start` must only spawn; it must not block or await.
    ///
    /// Returns `false` (and does not call `start`) when a loop already exists.
    pub fn start_if_absent<F>(
        &self,
        key: &str,
        coordinates: TypeCoordinates,
        kinds: Vec<(GroupVersionKind, TypeCoordinates)>,
        start: F,
    ) -> bool
    where
        F: FnOnce(&TypeCoordinates) -> (CancellationToken, JoinHandle<()>),
    {
        let mut state = self.lock();
        if state.loops.contains_key(key) {
            return false;
        }

        let (cancel, handle) = start(&coordinates);
        for (gvk, kind_coordinates) in kinds {
            state.register(key, gvk, kind_coordinates);
        }
        state.loops.insert(
            key.to_string(),
            RunningLoop {
                coordinates,
                cancel,
                handle,
            },
        );
        true
    }

    /// Cancel and remove the loop for `key` and release the kinds it registered.
    ///
    /// Kinds also registered by another key stay. Does not wait for in-flight
    /// reconciles; callers may await the returned loop's task.
    pub fn unregister(&self, key: &str) -> Unregistered {
        let mut state = self.lock();
        let running = state.loops.remove(key);
        if let Some(running) = &running {
            running.cancel.cancel();
        }
        let kinds = state.release(key);
        debug!(key = key, kinds = kinds.len(), stopped = running.is_some(), "Unregistered addressable type");
        Unregistered { running, kinds }
    }

    /// Cancel every running loop and clear the registry.
    pub fn shutdown(&self) -> Vec<RunningLoop> {
        let mut state = self.lock();
        state.kinds.clear();
        state.owned.clear();
        let drained: Vec<RunningLoop> = state.loops.drain().map(|(_, running)| running).collect();
        for running in &drained {
            running.cancel.cancel();
        }
        drained
    }
}

impl AddressableInfo for AddressableRegistry {
    fn is_gvk_addressable(&self, gvk: &GroupVersionKind) -> bool {
        self.lock().kinds.contains_key(gvk)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
