// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller-lifecycle manager for addressable resource types.
//!
//! Watches `CustomResourceDefinition`s and keeps exactly one trigger loop running for
//! every namespaced CRD labelled `duck.knative.dev/addressable: "true"`:
//!
//! - a qualifying CRD with no loop gets one, bound to its first served version, and
//!   every served version's kind is registered for the ownership-chain guard
//! - a qualifying cluster-scoped CRD gets no loop, but its kinds are registered
//! - a CRD being deleted has its loop cancelled and its kinds unregistered
//! - anything else is a no-op
//!
//! Each loop runs under a child of the manager's [`CancellationToken`], so cancelling the
//! manager stops every loop while cancelling one loop leaves the others running.

pub mod coordinates;

use crate::client::ObjectCache;
use crate::errors::AutoTriggerError;
use crate::metrics;
use crate::registry::{AddressableRegistry, TypeCoordinates};
use coordinates::{crd_loop_key, is_addressable, is_namespaced, served_coordinates, static_loop_key};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::GroupVersionKind;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Starts a trigger loop for one resource type.
///
/// `spawn` is called while the registry lock is held: it must hand the loop to the
/// runtime and return immediately.
pub trait LoopSpawner: Send + Sync {
    fn spawn(&self, coordinates: TypeCoordinates, token: CancellationToken) -> JoinHandle<()>;
}

/// Why a type definition event needed no lifecycle change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The definition is gone and no loop was running for it
    NotFound,
    /// The definition is being deleted and no loop was running for it
    NotRunning,
    /// Triggers are namespaced, so cluster-scoped parents get no loop
    ClusterScoped,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::NotFound => f.write_str("not found"),
            IgnoreReason::NotRunning => f.write_str("not running"),
            IgnoreReason::ClusterScoped => f.write_str("cluster-scoped"),
        }
    }
}

/// Result of one lifecycle reconcile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// A loop was started for these coordinates
    Started(TypeCoordinates),
    /// The running loop was cancelled and unregistered
    Stopped,
    /// Kinds of a type without a loop were unregistered
    Unregistered,
    AlreadyRunning,
    NotAddressable,
    Ignored(IgnoreReason),
}

/// Register `kinds` and start a loop for `key` under a child of `root`, unless one runs.
fn start_loop(
    registry: &AddressableRegistry,
    spawner: &dyn LoopSpawner,
    root: &CancellationToken,
    key: &str,
    coordinates: TypeCoordinates,
    kinds: Vec<(GroupVersionKind, TypeCoordinates)>,
) -> bool {
    let started = registry.start_if_absent(key, coordinates, kinds, |coordinates| {
        let token = root.child_token();
        let handle = spawner.spawn(coordinates.clone(), token.clone());
        (token, handle)
    });
    if started {
        metrics::set_running_loops(registry.running_keys().len());
    }
    started
}

/// Start a loop for a type named on the command line rather than by a CRD label.
///
/// The loop lives until `root` is cancelled. Returns `false` if it already runs.
pub fn start_static_loop(
    registry: &AddressableRegistry,
    spawner: &dyn LoopSpawner,
    root: &CancellationToken,
    coordinates: TypeCoordinates,
) -> bool {
    let key = static_loop_key(&coordinates);
    let kinds = vec![(coordinates.gvk(), coordinates.clone())];
    let started = start_loop(registry, spawner, root, &key, coordinates, kinds);
    if started {
        info!(key = %key, "Started static trigger loop");
    }
    started
}

/// Reconciles `CustomResourceDefinition`s into running trigger loops.
pub struct AddressableCrdReconciler {
    crds: Arc<dyn ObjectCache<CustomResourceDefinition>>,
    registry: Arc<AddressableRegistry>,
    spawner: Arc<dyn LoopSpawner>,
    root: CancellationToken,
}

impl AddressableCrdReconciler {
    #[must_use]
    pub fn new(
        crds: Arc<dyn ObjectCache<CustomResourceDefinition>>,
        registry: Arc<AddressableRegistry>,
        spawner: Arc<dyn LoopSpawner>,
        root: CancellationToken,
    ) -> Self {
        Self {
            crds,
            registry,
            spawner,
            root,
        }
    }

    /// Start or stop the trigger loop of the CRD called `name`.
    ///
    /// # Errors
    ///
    /// - [`AutoTriggerError::Api`] if the CRD cannot be read.
    /// - [`AutoTriggerError::NoServedVersion`] for an addressable CRD serving no version.
    ///   Nothing is registered in that case.
    pub async fn reconcile(&self, name: &str) -> Result<LifecycleOutcome, AutoTriggerError> {
        let Some(cached) = self.crds.get(None, name).await? else {
            // The watch-driven controller only delivers cached objects; this path is
            // reached by direct callers.
            return Ok(self.stop(name, IgnoreReason::NotFound));
        };
        let crd = CustomResourceDefinition::clone(&cached);
        let key = crd_loop_key(&crd);

        if crd.metadata.deletion_timestamp.is_some() {
            return Ok(self.stop(&key, IgnoreReason::NotRunning));
        }

        if !is_addressable(&crd) {
            debug!(crd = %key, "CustomResourceDefinition is not addressable");
            return Ok(LifecycleOutcome::NotAddressable);
        }

        if self.registry.is_running(&key) {
            return Ok(LifecycleOutcome::AlreadyRunning);
        }

        let served = served_coordinates(&crd);
        let Some(coordinates) = served.first().cloned() else {
            error!(crd = %key, "Addressable CustomResourceDefinition serves no version");
            return Err(AutoTriggerError::NoServedVersion { name: key });
        };
        let kinds = served.into_iter().map(|c| (c.gvk(), c)).collect();

        // No loop for cluster-scoped types, but their kinds still suppress nested owners.
        if !is_namespaced(&crd) {
            if self.registry.register_kinds(&key, kinds) {
                info!(crd = %key, "Registered cluster-scoped addressable kinds without a trigger loop");
            }
            return Ok(LifecycleOutcome::Ignored(IgnoreReason::ClusterScoped));
        }

        if start_loop(
            &self.registry,
            self.spawner.as_ref(),
            &self.root,
            &key,
            coordinates.clone(),
            kinds,
        ) {
            info!(crd = %key, resource = %coordinates, "Started trigger loop");
            Ok(LifecycleOutcome::Started(coordinates))
        } else {
            Ok(LifecycleOutcome::AlreadyRunning)
        }
    }

    fn stop(&self, key: &str, otherwise: IgnoreReason) -> LifecycleOutcome {
        let removed = self.registry.unregister(key);
        match removed.running {
            Some(stopped) => {
                metrics::set_running_loops(self.registry.running_keys().len());
                info!(crd = %key, resource = %stopped.coordinates, "Stopped trigger loop");
                LifecycleOutcome::Stopped
            }
            None if !removed.kinds.is_empty() => {
                info!(crd = %key, kinds = removed.kinds.len(), "Unregistered addressable kinds");
                LifecycleOutcome::Unregistered
            }
            None => LifecycleOutcome::Ignored(otherwise),
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
