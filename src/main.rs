// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use autotrigger::{
    config::{load_static_types, Cli, LogFormat},
    constants::TOKIO_WORKER_THREADS,
    context::Context,
    controllers::{resolve_static_type, run_crd_controller, KubeLoopSpawner},
    metrics::{self, serve_metrics},
    reconcilers::crds::start_static_loop,
};
use clap::Parser;
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("autotrigger-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

fn initialize_logging(format: LogFormat) {
    // Respects RUST_LOG if set, otherwise defaults to INFO level
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
        () = token.cancelled() => {}
    }
    token.cancel();
}

async fn async_main(cli: Cli) -> Result<()> {
    initialize_logging(cli.log_format);

    let settings = cli.controller_settings();
    info!(
        workers = settings.workers,
        label_policy = %settings.label_policy,
        prune_when_empty = settings.prune_when_empty,
        "Starting autotrigger controller"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let context = Arc::new(Context::new(client.clone(), settings));
    let root = CancellationToken::new();
    tokio::spawn(shutdown_signal(root.clone()));

    let metrics_token = root.clone();
    let metrics_port = cli.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = serve_metrics(metrics_port, metrics_token).await {
            error!(error = %e, port = metrics_port, "Metrics server failed");
        }
    });

    if let Some(path) = &cli.static_types {
        let spawner = KubeLoopSpawner::new(context.clone());
        for static_type in load_static_types(path)? {
            let coordinates = resolve_static_type(&client, &static_type).await?;
            if !start_static_loop(&context.registry, &spawner, &root, coordinates) {
                warn!(resource = %static_type, "Static type listed twice, ignoring duplicate");
            }
        }
    }

    let result = run_crd_controller(context.clone(), root.clone()).await;
    if let Err(e) = &result {
        error!(error = %e, "CustomResourceDefinition controller exited with an error");
    }

    // Stop every loop, static ones included, and wait for them to drain.
    root.cancel();
    for running in context.registry.shutdown() {
        if let Err(e) = running.handle.await {
            warn!(resource = %running.coordinates, error = %e, "Trigger loop task failed");
        }
    }
    metrics::set_running_loops(0);
    info!("Autotrigger controller stopped");

    result
}
