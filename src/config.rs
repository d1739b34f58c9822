// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line and environment configuration.
//!
//! Every flag has an environment fallback so the controller can be configured from a
//! Deployment manifest without changing its arguments.

use crate::constants::{DEFAULT_WORKERS, METRICS_SERVER_PORT};
use crate::labels::LabelPolicy;
use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Creates Knative `Trigger`s for addressable resources that opt in by label.
#[derive(Clone, Debug, Parser)]
#[command(name = "autotrigger", version, about, long_about = None)]
pub struct Cli {
    /// Parents reconciled in parallel by each per-type loop
    #[arg(long, env = "AUTOTRIGGER_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers: u16,

    /// How labels are derived for generated triggers
    #[arg(
        long,
        env = "AUTOTRIGGER_LABEL_POLICY",
        value_enum,
        default_value_t = LabelPolicy::PassThrough
    )]
    pub label_policy: LabelPolicy,

    /// Delete existing triggers when a parent's filter annotation is removed
    #[arg(long, env = "AUTOTRIGGER_PRUNE_WHEN_EMPTY")]
    pub prune_when_empty: bool,

    /// JSON file listing resource types to reconcile regardless of CRD labels
    #[arg(long, env = "AUTOTRIGGER_STATIC_TYPES")]
    pub static_types: Option<PathBuf>,

    /// Port of the Prometheus `/metrics` endpoint
    #[arg(long, env = "AUTOTRIGGER_METRICS_PORT", default_value_t = METRICS_SERVER_PORT)]
    pub metrics_port: u16,

    #[arg(long, env = "RUST_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Settings shared by every per-type loop.
    #[must_use]
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            workers: self.workers.max(1),
            label_policy: self.label_policy,
            prune_when_empty: self.prune_when_empty,
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Behaviour of every per-type trigger loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Concurrent reconciles per loop
    pub workers: u16,
    pub label_policy: LabelPolicy,
    /// Delete stale triggers even when the parent requests none
    pub prune_when_empty: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            label_policy: LabelPolicy::default(),
            prune_when_empty: false,
        }
    }
}

/// A resource type reconciled for the whole process lifetime, named by
/// group, version and plural resource name.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct StaticType {
    /// API group; empty for the core group
    #[serde(default)]
    pub group: String,
    pub version: String,
    /// Plural resource name (e.g., `services`)
    pub resource: String,
}

impl fmt::Display for StaticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}/{}", self.resource, self.group, self.version)
    }
}

/// Parse a JSON list of [`StaticType`]s.
///
/// # Errors
///
/// Returns an error if `raw` is not a JSON list of `{"group","version","resource"}`
/// objects, or an entry has an empty version or resource.
pub fn parse_static_types(raw: &str) -> Result<Vec<StaticType>> {
    let types: Vec<StaticType> =
        serde_json::from_str(raw).context("static types must be a JSON list of {group, version, resource}")?;
    for static_type in &types {
        if static_type.version.is_empty() || static_type.resource.is_empty() {
            anyhow::bail!("static type {static_type} needs both a version and a resource");
        }
    }
    Ok(types)
}

/// Read and parse a static type file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub fn load_static_types(path: &Path) -> Result<Vec<StaticType>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read static types from {}", path.display()))?;
    parse_static_types(&raw).with_context(|| format!("Invalid static types in {}", path.display()))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
