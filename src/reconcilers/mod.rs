// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation logic.
//!
//! - [`autotrigger`] - Trigger set-reconciler for parents of one addressable type
//! - [`crds`] - Lifecycle manager starting and stopping per-type trigger loops
//! - [`pagination`] - Paginated list helper

pub mod autotrigger;
pub mod crds;
pub mod pagination;

#[cfg(test)]
pub(crate) mod fakes;

pub use autotrigger::{AutoTriggerReconciler, ReconcileOutcome, SkipReason, SyncReport};
pub use crds::{AddressableCrdReconciler, LifecycleOutcome, LoopSpawner};
