// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired `Trigger` construction from a parent's filter annotation.

use crate::constants::{FILTER_ANNOTATION, MATCH_ALL_FILTER_VALUES, MAX_GENERATE_NAME_PREFIX_LEN};
use crate::crd::{SourceAndType, SubscriberSpec, Trigger, TriggerFilter, TriggerSpec};
use crate::errors::AutoTriggerError;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ApiResource, DynamicObject};
use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of the filter annotation: which broker to subscribe to and which
/// `source`/`type` attributes to match. Empty fields mean "any".
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct BrokerFilter {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub broker: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

/// Parse a raw filter annotation value.
///
/// `""`, `"[]"` and `"[{}]"` all yield a single match-everything filter; `null` yields
/// no filters.
///
/// # Errors
///
/// Returns [`AutoTriggerError::MalformedPolicyInput`] when `raw` is not a JSON list of
/// filter objects.
pub fn parse_filters(raw: &str) -> Result<Vec<BrokerFilter>, AutoTriggerError> {
    if MATCH_ALL_FILTER_VALUES.contains(&raw) {
        return Ok(vec![BrokerFilter::default()]);
    }

    serde_json::from_str::<Option<Vec<BrokerFilter>>>(raw)
        .map(Option::unwrap_or_default)
        .map_err(|source| AutoTriggerError::MalformedPolicyInput {
            raw: raw.to_string(),
            source,
        })
}

/// Filters requested by `parent`, in annotation order. No annotation means no triggers.
///
/// # Errors
///
/// Returns [`AutoTriggerError::MalformedPolicyInput`] for an unparsable annotation.
pub fn desired_filters<K: ResourceExt>(parent: &K) -> Result<Vec<BrokerFilter>, AutoTriggerError> {
    match parent.annotations().get(FILTER_ANNOTATION) {
        Some(raw) => parse_filters(raw),
        None => Ok(Vec::new()),
    }
}

/// `generateName` prefix for triggers of the parent named `parent_name`.
#[must_use]
pub fn trigger_name_prefix(parent_name: &str) -> String {
    let max = MAX_GENERATE_NAME_PREFIX_LEN - 1;
    let mut base: String = parent_name.chars().take(max).collect();
    // Avoid "--" in front of the random suffix.
    while base.ends_with('-') {
        base.pop();
    }
    format!("{base}-")
}

/// Build the desired triggers for `parent`.
///
/// Every trigger is controlled by `parent`, carries `labels`, subscribes `parent` and is
/// named from [`trigger_name_prefix`] by the API server.
///
/// # Errors
///
/// Returns [`AutoTriggerError::MalformedPolicyInput`] for an unparsable filter annotation
/// and [`AutoTriggerError::MissingUid`] if `parent` has no UID.
pub fn make_triggers(
    parent: &DynamicObject,
    resource: &ApiResource,
    labels: &BTreeMap<String, String>,
) -> Result<Vec<Trigger>, AutoTriggerError> {
    let filters = desired_filters(parent)?;
    if filters.is_empty() {
        return Ok(Vec::new());
    }

    let name = parent.name_any();
    let owner = parent
        .controller_owner_ref(resource)
        .ok_or_else(|| AutoTriggerError::MissingUid {
            kind: resource.kind.clone(),
            name: name.clone(),
        })?;

    let subscriber = SubscriberSpec {
        r#ref: Some(ObjectReference {
            api_version: Some(resource.api_version.clone()),
            kind: Some(resource.kind.clone()),
            name: Some(name.clone()),
            ..Default::default()
        }),
        uri: None,
    };

    Ok(filters
        .into_iter()
        .map(|filter| Trigger {
            metadata: ObjectMeta {
                generate_name: Some(trigger_name_prefix(&name)),
                namespace: parent.namespace(),
                owner_references: Some(vec![owner.clone()]),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: TriggerSpec {
                broker: filter.broker,
                filter: Some(TriggerFilter {
                    source_and_type: Some(SourceAndType {
                        source: filter.source,
                        r#type: filter.r#type,
                    }),
                }),
                subscriber: Some(subscriber.clone()),
                generation: None,
            },
            status: None,
        })
        .collect())
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
