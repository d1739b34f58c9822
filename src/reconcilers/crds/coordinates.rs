// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Type coordinates derived from `CustomResourceDefinition`s and API discovery.

use crate::config::StaticType;
use crate::constants::{ADDRESSABLE_LABEL, ADDRESSABLE_LABEL_VALUE, CRD_SCOPE_NAMESPACED, STATIC_LOOP_KEY_PREFIX};
use crate::registry::TypeCoordinates;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::ApiResource;
use kube::discovery::{ApiCapabilities, Scope};
use kube::ResourceExt;

/// Whether the CRD carries the addressable marker label with the exact value `"true"`.
#[must_use]
pub fn is_addressable(crd: &CustomResourceDefinition) -> bool {
    crd.labels().get(ADDRESSABLE_LABEL).map(String::as_str) == Some(ADDRESSABLE_LABEL_VALUE)
}

#[must_use]
pub fn is_namespaced(crd: &CustomResourceDefinition) -> bool {
    crd.spec.scope == CRD_SCOPE_NAMESPACED
}

/// Registry key of the loop started for a CRD.
#[must_use]
pub fn crd_loop_key(crd: &CustomResourceDefinition) -> String {
    crd.name_any()
}

/// Registry key of the loop started for a statically configured type.
#[must_use]
pub fn static_loop_key(coordinates: &TypeCoordinates) -> String {
    format!("{STATIC_LOOP_KEY_PREFIX}{coordinates}")
}

/// Coordinates of every served version, in the order the CRD lists them.
#[must_use]
pub fn served_coordinates(crd: &CustomResourceDefinition) -> Vec<TypeCoordinates> {
    crd.spec
        .versions
        .iter()
        .filter(|version| version.served)
        .map(|version| TypeCoordinates {
            group: crd.spec.group.clone(),
            version: version.name.clone(),
            kind: crd.spec.names.kind.clone(),
            plural: crd.spec.names.plural.clone(),
        })
        .collect()
}

/// Pick the discovered resource named by `static_type`.
///
/// Subresources such as `services/status` never match. Returns `None` when the
/// resource is not served or is cluster-scoped.
#[must_use]
pub fn coordinates_from_discovery(
    static_type: &StaticType,
    resources: &[(ApiResource, ApiCapabilities)],
) -> Option<TypeCoordinates> {
    resources
        .iter()
        .find(|(resource, capabilities)| {
            resource.plural == static_type.resource
                && resource.version == static_type.version
                && matches!(capabilities.scope, Scope::Namespaced)
        })
        .map(|(resource, _)| TypeCoordinates {
            group: resource.group.clone(),
            version: resource.version.clone(),
            kind: resource.kind.clone(),
            plural: resource.plural.clone(),
        })
}

#[cfg(test)]
#[path = "coordinates_tests.rs"]
mod coordinates_tests;
