// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label policy for parent resources and the triggers generated from them.
//!
//! A parent opts in through [`AUTOTRIGGER_LABEL`]. Generated triggers carry a copy of the
//! parent's labels, which doubles as the label selector used to list them again.

use crate::constants::{AUTOTRIGGER_LABEL, SERVICE_NAME_LABEL};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;

/// Whether a parent resource asked for triggers.
///
/// True iff [`AUTOTRIGGER_LABEL`] is present and equals `"true"` ignoring ASCII case.
#[must_use]
pub fn is_opted_in<K: ResourceExt>(parent: &K) -> bool {
    parent
        .labels()
        .get(AUTOTRIGGER_LABEL)
        .is_some_and(|enabled| enabled.eq_ignore_ascii_case("true"))
}

/// How labels are derived for generated triggers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LabelPolicy {
    /// Copy the parent's labels unchanged
    #[default]
    PassThrough,
    /// Copy the parent's labels and add [`SERVICE_NAME_LABEL`] set to the parent's name
    ServiceName,
}

impl LabelPolicy {
    /// Labels applied to every trigger generated for `parent`.
    ///
    /// The parent's own labels win over the injected service-name label.
    #[must_use]
    pub fn derived_labels<K: ResourceExt>(&self, parent: &K) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        if *self == LabelPolicy::ServiceName {
            labels.insert(SERVICE_NAME_LABEL.to_string(), parent.name_any());
        }

        // Pass through the labels on the parent to child resources.
        labels.extend(
            parent
                .labels()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        labels
    }
}

impl fmt::Display for LabelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelPolicy::PassThrough => f.write_str("pass-through"),
            LabelPolicy::ServiceName => f.write_str("service-name"),
        }
    }
}

/// Render labels as an equality-based label selector (`k1=v1,k2=v2`).
#[must_use]
pub fn selector_from_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
#[path = "labels_tests.rs"]
mod labels_tests;
