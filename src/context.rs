// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! The lifecycle manager and every per-type trigger loop receive an `Arc<Context>`
//! that contains:
//! - Kubernetes client
//! - The addressable registry shared by the lifecycle manager and the ownership guard
//! - Settings applied to every trigger loop

use crate::config::ControllerSettings;
use crate::registry::AddressableRegistry;
use kube::Client;
use std::sync::Arc;

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for API operations
    pub client: Client,

    /// Running loops and addressable kinds
    pub registry: Arc<AddressableRegistry>,

    /// Behaviour of every per-type trigger loop
    pub settings: ControllerSettings,
}

impl Context {
    #[must_use]
    pub fn new(client: Client, settings: ControllerSettings) -> Self {
        Self {
            client,
            registry: Arc::new(AddressableRegistry::new()),
            settings,
        }
    }
}
