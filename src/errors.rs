// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for trigger reconciliation and controller lifecycle management.
//!
//! Not-found conditions never surface here: they are terminal successes and are
//! reported as skip outcomes by the reconcilers instead.

use thiserror::Error;

/// Errors returned by the set-reconciler and the controller-lifecycle manager.
#[derive(Error, Debug)]
pub enum AutoTriggerError {
    /// A work-queue key that can never resolve to an object
    #[error("invalid resource key: {key:?}")]
    MalformedKey {
        /// The offending key
        key: String,
    },

    /// The trigger filter annotation is not valid JSON for a filter list
    ///
    /// Permanent until the parent resource is edited; editing it re-triggers reconciliation.
    #[error("failed to extract auto-trigger filters from {raw:?}: {source}")]
    MalformedPolicyInput {
        /// The raw annotation value
        raw: String,
        /// The JSON parse error
        #[source]
        source: serde_json::Error,
    },

    /// An addressable `CustomResourceDefinition` serves no version
    #[error("unable to find a served version for CustomResourceDefinition {name:?}")]
    NoServedVersion {
        /// Name of the `CustomResourceDefinition`
        name: String,
    },

    /// An object read from the API server has no UID
    ///
    /// Every persisted object has one, so this is an invariant violation. It fails the
    /// single reconcile attempt and nothing else.
    #[error("{kind} {name:?} has no uid")]
    MissingUid {
        /// Kind of the object
        kind: String,
        /// Name of the object
        name: String,
    },

    /// Any Kubernetes API failure (get, list, create, delete)
    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),
}

impl AutoTriggerError {
    /// Whether re-queueing the same key can succeed without the object changing.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, AutoTriggerError::Api(_))
    }

    /// Short, stable label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AutoTriggerError::MalformedKey { .. } => "malformed_key",
            AutoTriggerError::MalformedPolicyInput { .. } => "malformed_policy_input",
            AutoTriggerError::NoServedVersion { .. } => "no_served_version",
            AutoTriggerError::MissingUid { .. } => "missing_uid",
            AutoTriggerError::Api(_) => "api",
        }
    }
}

/// Whether a Kubernetes error is an HTTP 404 from the API server.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 404)
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
