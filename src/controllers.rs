// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller wiring for the lifecycle manager and the per-type trigger loops.
//!
//! Both controllers follow the same pattern: the kube-rs [`Controller`] delivers an
//! object, the wrapper turns it into a cache key, calls the reconciler, records metrics,
//! and maps the result to an [`Action`]. Retriable failures are requeued by
//! [`error_policy`]; permanent ones wait for the object to change.

use crate::client::{KubeTriggerApi, StoreCache};
use crate::config::StaticType;
use crate::constants::{
    ADDRESSABLE_LABEL, ADDRESSABLE_LABEL_VALUE, ERROR_REQUEUE_DURATION_SECS, KIND_CUSTOM_RESOURCE_DEFINITION,
    WATCH_TIMEOUT_SECS,
};
use crate::context::Context;
use crate::crd::Trigger;
use crate::errors::AutoTriggerError;
use crate::metrics::{self, STATUS_DEGRADED, STATUS_ERROR, STATUS_SKIPPED, STATUS_SYNCED};
use crate::reconcilers::autotrigger::{AutoTriggerReconciler, ReconcileOutcome};
use crate::reconcilers::crds::coordinates::coordinates_from_discovery;
use crate::reconcilers::crds::{AddressableCrdReconciler, LifecycleOutcome, LoopSpawner};
use crate::registry::TypeCoordinates;
use anyhow::{anyhow, Context as _, Result};
use futures::StreamExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DynamicObject};
use kube::core::GroupVersion;
use kube::runtime::controller::{Action, Config as ControllerConfig, Error as ControllerError};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::ResourceExt;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reconciliation error wrapper
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ReconcileError(#[from] AutoTriggerError);

/// Error policy for every controller.
///
/// Only retriable errors reach this point; they are requeued after a fixed delay.
#[allow(clippy::needless_pass_by_value)] // Signature required by kube::runtime::Controller
fn error_policy<T, C>(resource: Arc<T>, err: &ReconcileError, _ctx: Arc<C>) -> Action
where
    T: ResourceExt + Debug,
{
    error!(
        error = %err,
        name = %resource.name_any(),
        namespace = ?resource.namespace(),
        "Reconciliation error - will retry in {}s",
        ERROR_REQUEUE_DURATION_SECS
    );
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// Map a reconcile failure to the controller's result.
///
/// Permanent failures are logged and parked until the object changes; retriable ones
/// are handed to [`error_policy`].
fn settle_error(err: AutoTriggerError, key: &str) -> Result<Action, ReconcileError> {
    if err.is_retriable() {
        Err(err.into())
    } else {
        error!(key = key, error = %err, error_kind = err.kind(), "Reconciliation failed permanently");
        Ok(Action::await_change())
    }
}

/// Metric status of a trigger reconcile outcome.
fn outcome_status(outcome: &ReconcileOutcome) -> &'static str {
    match outcome {
        ReconcileOutcome::Skipped(_) => STATUS_SKIPPED,
        ReconcileOutcome::Synced(report) if report.is_degraded() => STATUS_DEGRADED,
        ReconcileOutcome::Synced(_) => STATUS_SYNCED,
    }
}

/// Whether a controller stream error means the watch itself is failing.
///
/// Those are surfaced at `warn`; the rest (objects gone from the store, reconcile
/// failures already handled by [`error_policy`]) stay at `debug`.
fn is_watch_failure<R, Q>(err: &ControllerError<R, Q>) -> bool
where
    R: 'static,
    Q: 'static,
{
    matches!(err, ControllerError::QueueError(_) | ControllerError::RunnerError(_))
}

/// Work-queue key of a parent object.
fn parent_key(parent: &DynamicObject) -> String {
    match parent.namespace() {
        Some(namespace) => format!("{namespace}/{}", parent.name_any()),
        None => parent.name_any(),
    }
}

/// Run the trigger loop for one addressable resource type until `token` is cancelled.
///
/// The loop watches parents of type `coordinates` and the triggers they own, so a
/// trigger deleted out-of-band is recreated.
pub async fn run_trigger_controller(
    context: Arc<Context>,
    coordinates: TypeCoordinates,
    token: CancellationToken,
) {
    info!(resource = %coordinates, workers = context.settings.workers, "Starting trigger controller");

    let client = context.client.clone();
    let resource = coordinates.api_resource();
    let parents = Api::<DynamicObject>::all_with(client.clone(), &resource);
    let triggers = Api::<Trigger>::all(client.clone());
    let watcher_config = WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    let controller = Controller::new_with(parents, watcher_config.clone(), resource.clone())
        .owns(triggers, watcher_config)
        .with_config(ControllerConfig::default().concurrency(context.settings.workers))
        .graceful_shutdown_on(token.cancelled_owned());

    let reconciler = Arc::new(AutoTriggerReconciler::new(
        resource.clone(),
        Arc::new(StoreCache::new(controller.store(), resource)),
        Arc::new(KubeTriggerApi::new(client)),
        context.registry.clone(),
        &context.settings,
    ));

    controller
        .run(reconcile_parent, error_policy, reconciler)
        .for_each(|result| {
            match result {
                Err(e) if is_watch_failure(&e) => {
                    warn!(resource = %coordinates, error = %e, "Trigger controller watch failed");
                }
                Err(e) => debug!(resource = %coordinates, error = %e, "Trigger controller event"),
                Ok(_) => {}
            }
            futures::future::ready(())
        })
        .await;

    info!(resource = %coordinates, "Trigger controller stopped");
}

/// Trigger reconcile wrapper: timing, metrics and error mapping.
async fn reconcile_parent(
    parent: Arc<DynamicObject>,
    reconciler: Arc<AutoTriggerReconciler>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let key = parent_key(&parent);

    let result = reconciler.reconcile(&key).await;
    let duration = start.elapsed();

    match result {
        Ok(outcome) => {
            metrics::record_reconciliation(reconciler.metric_resource(), outcome_status(&outcome), duration);
            match &outcome {
                ReconcileOutcome::Skipped(reason) => {
                    debug!(key = %key, reason = %reason, "Skipped trigger reconciliation");
                }
                ReconcileOutcome::Synced(report) => {
                    debug!(
                        key = %key,
                        created = report.created.len(),
                        kept = report.kept.len(),
                        deleted = report.deleted.len(),
                        failed_deletes = report.failed_deletes.len(),
                        "Reconciled triggers"
                    );
                }
            }
            Ok(Action::await_change())
        }
        Err(e) => {
            metrics::record_reconciliation(reconciler.metric_resource(), STATUS_ERROR, duration);
            settle_error(e, &key)
        }
    }
}

/// [`LoopSpawner`] running [`run_trigger_controller`] on the tokio runtime.
pub struct KubeLoopSpawner {
    context: Arc<Context>,
}

impl KubeLoopSpawner {
    #[must_use]
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }
}

impl LoopSpawner for KubeLoopSpawner {
    fn spawn(&self, coordinates: TypeCoordinates, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(run_trigger_controller(self.context.clone(), coordinates, token))
    }
}

/// Run the lifecycle manager until `token` is cancelled.
///
/// Only CRDs carrying the addressable marker label are watched. Every loop it starts
/// runs under a child of `token`.
///
/// # Errors
///
/// Currently always returns `Ok`; the controller stream ends on shutdown.
pub async fn run_crd_controller(context: Arc<Context>, token: CancellationToken) -> Result<()> {
    info!("Starting addressable CustomResourceDefinition controller");

    let crds = Api::<CustomResourceDefinition>::all(context.client.clone());
    let watcher_config = WatcherConfig::default()
        .labels(&format!("{ADDRESSABLE_LABEL}={ADDRESSABLE_LABEL_VALUE}"))
        .timeout(WATCH_TIMEOUT_SECS);

    let controller = Controller::new(crds, watcher_config).graceful_shutdown_on(token.clone().cancelled_owned());

    let manager = Arc::new(AddressableCrdReconciler::new(
        Arc::new(StoreCache::new(controller.store(), ())),
        context.registry.clone(),
        Arc::new(KubeLoopSpawner::new(context.clone())),
        token,
    ));

    controller
        .run(reconcile_crd, error_policy, manager)
        .for_each(|result| {
            match result {
                Err(e) if is_watch_failure(&e) => {
                    warn!(error = %e, "CustomResourceDefinition controller watch failed");
                }
                Err(e) => debug!(error = %e, "CustomResourceDefinition controller event"),
                Ok(_) => {}
            }
            futures::future::ready(())
        })
        .await;

    info!("Addressable CustomResourceDefinition controller stopped");
    Ok(())
}

/// Lifecycle reconcile wrapper: timing, metrics and error mapping.
async fn reconcile_crd(
    crd: Arc<CustomResourceDefinition>,
    manager: Arc<AddressableCrdReconciler>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let name = crd.name_any();

    let result = manager.reconcile(&name).await;
    let duration = start.elapsed();

    match result {
        Ok(outcome) => {
            let status = match outcome {
                LifecycleOutcome::Started(_)
                | LifecycleOutcome::Stopped
                | LifecycleOutcome::Unregistered => STATUS_SYNCED,
                _ => STATUS_SKIPPED,
            };
            metrics::record_reconciliation(KIND_CUSTOM_RESOURCE_DEFINITION, status, duration);
            debug!(crd = %name, outcome = ?outcome, "Reconciled CustomResourceDefinition");
            Ok(Action::await_change())
        }
        Err(e) => {
            metrics::record_reconciliation(KIND_CUSTOM_RESOURCE_DEFINITION, STATUS_ERROR, duration);
            settle_error(e, &name)
        }
    }
}

/// Resolve a statically configured type to coordinates through API discovery.
///
/// # Errors
///
/// Returns an error if discovery fails or the group version does not serve the
/// resource as a namespaced type.
pub async fn resolve_static_type(client: &kube::Client, static_type: &StaticType) -> Result<TypeCoordinates> {
    let group_version = GroupVersion::gv(&static_type.group, &static_type.version);
    let group = kube::discovery::pinned_group(client, &group_version)
        .await
        .with_context(|| format!("Failed to discover {static_type}"))?;
    let resources = group.versioned_resources(&static_type.version);

    coordinates_from_discovery(static_type, &resources).ok_or_else(|| {
        warn!(resource = %static_type, "Static type is not served as a namespaced resource");
        anyhow!("{static_type} is not served as a namespaced resource")
    })
}

#[cfg(test)]
#[path = "controllers_tests.rs"]
mod controllers_tests;
