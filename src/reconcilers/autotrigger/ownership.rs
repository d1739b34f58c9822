// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ownership-chain guard.
//!
//! A parent owned by another addressable resource is skipped so that only the
//! top-level resource of an owner chain gets triggers. Only direct owners are checked.

use crate::registry::{gvk_from_api_version, AddressableInfo};
use kube::ResourceExt;

/// Whether any owner reference of `parent` points at a registered addressable kind.
#[must_use]
pub fn is_owned_by_addressable<K: ResourceExt>(parent: &K, addressables: &dyn AddressableInfo) -> bool {
    parent.owner_references().iter().any(|owner| {
        addressables.is_gvk_addressable(&gvk_from_api_version(&owner.api_version, &owner.kind))
    })
}

#[cfg(test)]
#[path = "ownership_tests.rs"]
mod ownership_tests;
