// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use std::sync::Arc;
use tracing::{debug, info, warn};
use transfersim::{
    api::{router, AppState},
    blueprints::OwnershipBinding,
    config::{Cli, Settings},
    constants::TOKIO_WORKER_THREADS,
    gateway::{kubernetes::KubeGateway, ClusterGateway},
    lifecycle::LifecycleManager,
};

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("transfersim-api")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // RUST_LOG sets the level (default info), RUST_LOG_FORMAT=json switches to JSON
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
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

    let cli = Cli::parse();
    info!(release = %cli.release_name, "Starting transfersim control API");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    let settings = Settings::from_cli(&cli, client.default_namespace())
        .context("invalid configuration")?;
    info!(
        namespace = %settings.namespace,
        discovery_config_map = %settings.discovery_config_map,
        nas_pvc = %settings.nas_pvc_name,
        "Configuration resolved"
    );

    let gateway = Arc::new(KubeGateway::new(
        client,
        &settings.namespace,
        settings.cluster_timeout,
    ));
    let binding = resolve_binding(&*gateway, &cli).await?;
    info!(
        pod = %binding.pod_name,
        uid = %binding.pod_uid,
        "Dynamic servers will be bound to this pod"
    );

    let manager = LifecycleManager::new(gateway, Arc::new(settings), binding);

    // Servers bound to a previous pod may have been garbage-collected
    match manager.rebuild_document().await {
        Ok(document) => info!(entries = document.len(), "Published service discovery document"),
        Err(e) => warn!(error = %e, "Initial discovery document rebuild failed"),
    }

    let listener = tokio::net::TcpListener::bind(cli.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind_address))?;
    info!(address = %cli.bind_address, "Control API listening");

    axum::serve(listener, router(AppState::new(manager)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Graceful shutdown completed");
    Ok(())
}

/// Ownership binding target: the UID comes from the flag or from the pod itself
async fn resolve_binding(gateway: &dyn ClusterGateway, cli: &Cli) -> Result<OwnershipBinding> {
    if let Some(uid) = cli.pod_uid.as_deref().filter(|uid| !uid.is_empty()) {
        return Ok(OwnershipBinding::new(&cli.pod_name, uid));
    }

    debug!(pod = %cli.pod_name, "Looking up control-plane pod UID");
    let pod = gateway
        .get_pod(&cli.pod_name)
        .await?
        .with_context(|| format!("control-plane pod '{}' not found", cli.pod_name))?;
    let uid = pod
        .metadata
        .uid
        .with_context(|| format!("control-plane pod '{}' has no UID", cli.pod_name))?;
    Ok(OwnershipBinding::new(&cli.pod_name, &uid))
}

/// Completes on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        () = terminate => info!("Received SIGTERM (pod termination), initiating graceful shutdown"),
    }
}
