// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Knative Eventing `Trigger` resource types.
//!
//! The controller does not own the `Trigger` CRD; these types mirror the subset of the
//! `eventing.knative.dev/v1alpha1` schema it reads and writes.
//!
//! # Example: A trigger routing `demo` events to a parent
//!
//! ```rust,no_run
//! use autotrigger::crd::{SourceAndType, SubscriberSpec, TriggerFilter, TriggerSpec};
//! use k8s_openapi::api::core::v1::ObjectReference;
//!
//! let spec = TriggerSpec {
//!     broker: "default".to_string(),
//!     filter: Some(TriggerFilter {
//!         source_and_type: Some(SourceAndType {
//!             source: String::new(),
//!             r#type: "demo".to_string(),
//!         }),
//!     }),
//!     subscriber: Some(SubscriberSpec {
//!         r#ref: Some(ObjectReference {
//!             api_version: Some("example.io/v1".to_string()),
//!             kind: Some("Widget".to_string()),
//!             name: Some("my-widget".to_string()),
//!             ..Default::default()
//!         }),
//!         uri: None,
//!     }),
//!     generation: None,
//! };
//! ```

use k8s_openapi::api::core::v1::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `Trigger` routes events from a broker to a subscriber, optionally filtered.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "eventing.knative.dev",
    version = "v1alpha1",
    kind = "Trigger",
    namespaced,
    shortname = "trigger",
    derive = "PartialEq",
    derive = "Default"
)]
#[kube(status = "TriggerStatus")]
#[serde(rename_all = "camelCase")]
pub struct TriggerSpec {
    /// Broker the trigger subscribes to. Empty lets the eventing webhook default it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub broker: String,

    /// Attribute filter applied to events before delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<TriggerFilter>,

    /// Destination of matching events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<SubscriberSpec>,

    /// Spec generation stamped by the eventing webhook.
    ///
    /// Volatile: it changes without any user-visible change in routing, so it is
    /// cleared before two specs are compared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
}

/// Filter section of a [`TriggerSpec`].
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_and_type: Option<SourceAndType>,
}

/// Exact-match filter on the `source` and `type` `CloudEvents` attributes.
///
/// An empty value matches any attribute value.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SourceAndType {
    #[serde(default)]
    pub source: String,
    #[serde(default, rename = "type")]
    pub r#type: String,
}

/// Subscriber section of a [`TriggerSpec`].
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SubscriberSpec {
    /// Reference to the subscribing object
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<ObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Status reported by the eventing controller. Never written here.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber_uri: Option<String>,
}

impl TriggerSpec {
    /// Copy of this spec with volatile, webhook-maintained fields cleared.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            generation: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
