// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Autotrigger - Knative Trigger controller for addressable resources
//!
//! Autotrigger keeps Knative Eventing `Trigger`s in sync with the resources that want
//! them. Any namespaced custom resource whose `CustomResourceDefinition` is labelled
//! `duck.knative.dev/addressable: "true"` gets its own reconciliation loop, started and
//! stopped at runtime as CRDs come and go.
//!
//! ## Overview
//!
//! A parent resource opts in with the `eventing.knative.dev/autotrigger: "true"` label and
//! lists the triggers it wants in the `trigger.eventing.knative.dev/filter` annotation:
//!
//! ```yaml
//! metadata:
//!   labels:
//!     eventing.knative.dev/autotrigger: "true"
//!   annotations:
//!     trigger.eventing.knative.dev/filter: '[{"broker":"default","type":"demo"}]'
//! ```
//!
//! Each entry becomes a `Trigger` owned by and subscribing the parent. An empty value,
//! `[]` or `[{}]` asks for one trigger that matches every event.
//!
//! ## Modules
//!
//! - [`crd`] - Knative `Trigger` resource types
//! - [`labels`] - Opt-in check and label policies
//! - [`registry`] - Running loops and addressable kinds
//! - [`reconcilers`] - Trigger set-reconciler and CRD lifecycle manager
//! - [`controllers`] - kube-rs controller wiring
//! - [`client`] - Cache and trigger API seams
//! - [`config`] - Command-line configuration
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use autotrigger::reconcilers::autotrigger::plan::plan_triggers;
//!
//! // Nothing desired and nothing existing: nothing to do.
//! let plan = plan_triggers(Vec::new(), Vec::new());
//! assert!(plan.is_noop());
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod context;
pub mod controllers;
pub mod crd;
pub mod errors;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod registry;
