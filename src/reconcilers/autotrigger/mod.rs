// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Trigger set-reconciler for one addressable resource type.
//!
//! For a parent resource that opted in, the reconciler derives the desired triggers
//! from its filter annotation, lists the triggers it already controls, and creates or
//! deletes triggers until both sets agree. Triggers that already match are left alone;
//! nothing is ever updated in place.
//!
//! Terminal conditions (parent gone, not opted in, being deleted, owned by another
//! addressable, nothing requested) are successes reported as [`SkipReason`]s.

pub mod ownership;
pub mod plan;
pub mod resources;

use crate::client::{ObjectCache, TriggerApi};
use crate::config::ControllerSettings;
use crate::errors::AutoTriggerError;
use crate::labels::{is_opted_in, LabelPolicy};
use crate::metrics;
use crate::registry::AddressableInfo;
use kube::api::{ApiResource, DynamicObject};
use kube::ResourceExt;
use ownership::is_owned_by_addressable;
use plan::{filter_controlled, plan_triggers};
use resources::make_triggers;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a reconcile finished without touching triggers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The work-queue key does not name a namespaced object
    MalformedKey,
    /// The parent no longer exists
    NotFound,
    /// The parent does not carry the opt-in label
    NotOptedIn,
    /// The parent is being deleted; garbage collection removes its triggers
    BeingDeleted,
    /// The parent is owned by another addressable resource
    OwnedByAddressable,
    /// The parent requests no triggers and pruning is disabled
    NoTriggersRequested,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::MalformedKey => "malformed key",
            SkipReason::NotFound => "not found",
            SkipReason::NotOptedIn => "not opted in",
            SkipReason::BeingDeleted => "being deleted",
            SkipReason::OwnedByAddressable => "owned by an addressable resource",
            SkipReason::NoTriggersRequested => "no triggers requested",
        };
        f.write_str(reason)
    }
}

/// Names of the triggers touched by one successful reconcile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: Vec<String>,
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
    /// Stale triggers whose deletion failed
    pub failed_deletes: Vec<String>,
}

impl SyncReport {
    /// True when some stale trigger could not be deleted.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.failed_deletes.is_empty()
    }
}

/// Result of a successful reconcile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Skipped(SkipReason),
    Synced(SyncReport),
}

/// Split a `namespace/name` work-queue key.
///
/// Parents are namespaced, so a key without a namespace is malformed.
#[must_use]
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let (namespace, name) = key.split_once('/')?;
    if namespace.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((namespace, name))
}

/// Reconciles the triggers of every parent of one resource type.
///
/// Holds no per-parent state, so different keys may be reconciled concurrently.
pub struct AutoTriggerReconciler {
    resource: ApiResource,
    parents: Arc<dyn ObjectCache<DynamicObject>>,
    triggers: Arc<dyn TriggerApi>,
    addressables: Arc<dyn AddressableInfo>,
    label_policy: LabelPolicy,
    prune_when_empty: bool,
    /// Metric label for this resource type
    metric_resource: String,
}

impl AutoTriggerReconciler {
    #[must_use]
    pub fn new(
        resource: ApiResource,
        parents: Arc<dyn ObjectCache<DynamicObject>>,
        triggers: Arc<dyn TriggerApi>,
        addressables: Arc<dyn AddressableInfo>,
        settings: &ControllerSettings,
    ) -> Self {
        let metric_resource = format!("{}.{}", resource.plural, resource.api_version);
        Self {
            resource,
            parents,
            triggers,
            addressables,
            label_policy: settings.label_policy,
            prune_when_empty: settings.prune_when_empty,
            metric_resource,
        }
    }

    /// Dynamic type information of the parents this reconciler serves.
    #[must_use]
    pub fn resource(&self) -> &ApiResource {
        &self.resource
    }

    /// Label used for this reconciler's metrics.
    #[must_use]
    pub fn metric_resource(&self) -> &str {
        &self.metric_resource
    }

    /// Bring the triggers of the parent named by `key` in line with its filter annotation.
    ///
    /// # Errors
    ///
    /// - [`AutoTriggerError::Api`] when reading the parent, listing triggers or creating a
    ///   trigger fails. Creation stops at the first failure. Failed deletions of stale
    ///   triggers are reported in [`SyncReport::failed_deletes`] instead.
    /// - [`AutoTriggerError::MalformedPolicyInput`] for an unparsable filter annotation.
    /// - [`AutoTriggerError::MissingUid`] if the parent has no UID.
    pub async fn reconcile(&self, key: &str) -> Result<ReconcileOutcome, AutoTriggerError> {
        let Some((namespace, name)) = split_key(key) else {
            let err = AutoTriggerError::MalformedKey { key: key.to_string() };
            error!(error = %err, error_kind = err.kind(), kind = %self.resource.kind, "Dropping key");
            return Ok(ReconcileOutcome::Skipped(SkipReason::MalformedKey));
        };

        let Some(cached) = self.parents.get(Some(namespace), name).await? else {
            debug!(namespace = namespace, name = name, "Parent no longer exists");
            return Ok(ReconcileOutcome::Skipped(SkipReason::NotFound));
        };

        if !is_opted_in(cached.as_ref()) {
            debug!(namespace = namespace, name = name, "Parent has not opted in");
            return Ok(ReconcileOutcome::Skipped(SkipReason::NotOptedIn));
        }

        // Never mutate the shared cache entry.
        let parent = DynamicObject::clone(&cached);

        if parent.metadata.deletion_timestamp.is_some() {
            debug!(namespace = namespace, name = name, "Parent is being deleted");
            return Ok(ReconcileOutcome::Skipped(SkipReason::BeingDeleted));
        }

        if is_owned_by_addressable(&parent, self.addressables.as_ref()) {
            debug!(
                namespace = namespace,
                name = name,
                "Parent is owned by an addressable resource, skipping"
            );
            return Ok(ReconcileOutcome::Skipped(SkipReason::OwnedByAddressable));
        }

        let owner_uid = parent.uid().ok_or_else(|| AutoTriggerError::MissingUid {
            kind: self.resource.kind.clone(),
            name: name.to_string(),
        })?;
        let labels = self.label_policy.derived_labels(&parent);
        let existing = filter_controlled(self.triggers.list(namespace, &labels).await?, &owner_uid);

        let desired = make_triggers(&parent, &self.resource, &labels)?;
        if desired.is_empty() && !self.prune_when_empty {
            debug!(
                namespace = namespace,
                name = name,
                existing = existing.len(),
                "No triggers requested"
            );
            return Ok(ReconcileOutcome::Skipped(SkipReason::NoTriggersRequested));
        }

        let plan = plan_triggers(desired, existing);
        let mut report = SyncReport {
            kept: plan.keep.iter().map(ResourceExt::name_any).collect(),
            ..SyncReport::default()
        };

        for trigger in &plan.create {
            let created = self.triggers.create(namespace, trigger).await?;
            info!(
                namespace = namespace,
                name = name,
                trigger = %created.name_any(),
                "Created trigger"
            );
            metrics::record_trigger_created(&self.metric_resource);
            report.created.push(created.name_any());
        }

        for trigger in &plan.delete {
            let trigger_name = trigger.name_any();
            match self.triggers.delete(namespace, &trigger_name).await {
                Ok(()) => {
                    info!(
                        namespace = namespace,
                        name = name,
                        trigger = %trigger_name,
                        "Deleted stale trigger"
                    );
                    metrics::record_trigger_deleted(&self.metric_resource);
                    report.deleted.push(trigger_name);
                }
                Err(e) => {
                    warn!(
                        namespace = namespace,
                        name = name,
                        trigger = %trigger_name,
                        error = %e,
                        "Failed to delete stale trigger"
                    );
                    metrics::record_cleanup_failure(&self.metric_resource);
                    report.failed_deletes.push(trigger_name);
                }
            }
        }

        if report.is_degraded() {
            warn!(
                namespace = namespace,
                name = name,
                failed = ?report.failed_deletes,
                "Trigger cleanup incomplete; stale triggers remain until the parent changes"
            );
        }

        Ok(ReconcileOutcome::Synced(report))
    }
}
