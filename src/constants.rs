// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the autotrigger controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Kubernetes API Constants
// ============================================================================

/// Kind name for `CustomResourceDefinition`
pub const KIND_CUSTOM_RESOURCE_DEFINITION: &str = "CustomResourceDefinition";

/// Scope value of a namespaced `CustomResourceDefinition`
pub const CRD_SCOPE_NAMESPACED: &str = "Namespaced";

// ============================================================================
// Labels and Annotations
// ============================================================================

/// Label on a `CustomResourceDefinition` marking its kind as addressable.
///
/// Only the exact value `"true"` qualifies.
pub const ADDRESSABLE_LABEL: &str = "duck.knative.dev/addressable";

/// Value of [`ADDRESSABLE_LABEL`] that enables a per-type controller
pub const ADDRESSABLE_LABEL_VALUE: &str = "true";

/// Label on a parent resource opting it in to trigger generation (case-insensitive `"true"`)
pub const AUTOTRIGGER_LABEL: &str = "eventing.knative.dev/autotrigger";

/// Annotation on a parent resource holding the JSON list of trigger filters
pub const FILTER_ANNOTATION: &str = "trigger.eventing.knative.dev/filter";

/// Label injected by the `service-name` label policy, carrying the parent's name
pub const SERVICE_NAME_LABEL: &str = "serving.knative.dev/service";

/// Raw filter annotation values that all mean "one trigger without any filter"
pub const MATCH_ALL_FILTER_VALUES: [&str; 3] = ["", "[]", "[{}]"];

// ============================================================================
// Naming Constants
// ============================================================================

/// Maximum length of a `generateName` prefix the API server keeps intact
pub const MAX_GENERATE_NAME_PREFIX_LEN: usize = 58;

/// Key prefix for loops started from the static type list rather than a CRD
pub const STATIC_LOOP_KEY_PREFIX: &str = "static:";

// ============================================================================
// Controller Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Default number of concurrent reconciles per addressable-type loop
pub const DEFAULT_WORKERS: u16 = 2;

/// Watcher timeout (seconds) - must be less than the client read timeout (30s)
pub const WATCH_TIMEOUT_SECS: u32 = 25;

/// Page size for Kubernetes list operations
pub const KUBE_LIST_PAGE_SIZE: u32 = 100;

/// Field manager name used for API writes
pub const FIELD_MANAGER: &str = "autotrigger-controller";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
