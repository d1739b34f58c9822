// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired/existing set reconciliation for triggers.
//!
//! Triggers have generated names, so desired and existing triggers are paired by
//! semantic equality rather than by name.

use crate::crd::Trigger;
use kube::ResourceExt;

/// What to do with a parent's triggers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriggerPlan {
    /// Desired triggers without a semantic match, in desired order
    pub create: Vec<Trigger>,
    /// Existing triggers matched by a desired trigger, in desired order
    pub keep: Vec<Trigger>,
    /// Existing triggers no desired trigger matched, in list order
    pub delete: Vec<Trigger>,
}

impl TriggerPlan {
    /// True when applying the plan makes no API calls.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }
}

/// Whether `trigger` has a controller owner reference pointing at `owner_uid`.
#[must_use]
pub fn is_controlled_by(trigger: &Trigger, owner_uid: &str) -> bool {
    trigger
        .metadata
        .owner_references
        .iter()
        .flatten()
        .any(|owner| owner.controller == Some(true) && owner.uid == owner_uid)
}

/// Keep only the triggers controlled by the parent with `owner_uid`.
///
/// Label selectors alone can match another parent's triggers; those are never ours.
#[must_use]
pub fn filter_controlled(triggers: Vec<Trigger>, owner_uid: &str) -> Vec<Trigger> {
    triggers
        .into_iter()
        .filter(|trigger| is_controlled_by(trigger, owner_uid))
        .collect()
}

/// Two triggers are semantically equal when their specs (minus volatile fields) and
/// their label sets are equal. Names, owners and status are ignored.
#[must_use]
pub fn semantic_equals(desired: &Trigger, existing: &Trigger) -> bool {
    desired.spec.normalized() == existing.spec.normalized() && desired.labels() == existing.labels()
}

/// Remove and return the first trigger in `triggers` semantically equal to `like`.
pub fn extract_trigger_like(triggers: &mut Vec<Trigger>, like: &Trigger) -> Option<Trigger> {
    let index = triggers
        .iter()
        .position(|trigger| semantic_equals(like, trigger))?;
    Some(triggers.remove(index))
}

/// Pair each desired trigger with at most one existing trigger.
///
/// Desired triggers are processed in order and each consumes the first unclaimed
/// semantic match; leftovers on either side become creations or deletions.
#[must_use]
pub fn plan_triggers(desired: Vec<Trigger>, mut existing: Vec<Trigger>) -> TriggerPlan {
    let mut plan = TriggerPlan::default();
    for desired_trigger in desired {
        match extract_trigger_like(&mut existing, &desired_trigger) {
            Some(found) => plan.keep.push(found),
            None => plan.create.push(desired_trigger),
        }
    }
    plan.delete = existing;
    plan
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod plan_tests;
