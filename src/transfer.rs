// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration export and import.
//!
//! Export snapshots every discovered server, static and dynamic, with the
//! credentials needed to recreate it. Import replays a snapshot through the
//! lifecycle manager one item at a time. Each item runs under its own timeout
//! and a failed item never stops the remaining ones.

use crate::constants::EXPORT_FORMAT_VERSION;
use crate::discovery::ensure_dynamic;
use crate::errors::{GatewayError, ServerError, ServerResult};
use crate::lifecycle::LifecycleManager;
use crate::metrics;
use crate::naming::rename_candidate;
use crate::types::{
    ConflictResolution, DiscoveredServer, ExportedServer, ImportFailure, ImportRequest,
    ImportResult, ServerConfigurationExport, ServerCreationRequest,
};
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Upper bound on rename attempts for one item
const MAX_RENAME_ATTEMPTS: u32 = 100;

/// What happened to one successfully processed import item
#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemOutcome {
    Created(String),
    Replaced(String),
    Renamed { from: String, to: String },
    Skipped(String),
}

/// Snapshot every discovered server.
///
/// # Errors
///
/// Returns a cluster error if the scan fails.
pub async fn export(manager: &LifecycleManager) -> ServerResult<ServerConfigurationExport> {
    let start = Instant::now();
    let result = manager.list_servers().await.map(|servers| {
        let settings = manager.settings();
        ServerConfigurationExport {
            version: EXPORT_FORMAT_VERSION.to_string(),
            exported_at: Utc::now(),
            namespace: settings.namespace.clone(),
            release_name: settings.release_name.clone(),
            servers: servers.into_iter().map(exported_server).collect(),
        }
    });

    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_operation("export", "all", status, start.elapsed());
    if let Ok(export) = &result {
        info!(servers = export.servers.len(), "Exported server configuration");
    }
    result
}

fn exported_server(server: DiscoveredServer) -> ExportedServer {
    let request = server.config.unwrap_or_else(|| ServerCreationRequest {
        name: Some(server.name.clone()),
        node_port: server.node_port,
        ..Default::default()
    });
    ExportedServer {
        protocol: server.protocol,
        is_dynamic: server.is_dynamic,
        managed_by: server.managed_by,
        request,
    }
}

/// Replay an export against the current cluster.
///
/// Item failures are reported in [`ImportResult::failed`] and do not abort the
/// import.
///
/// # Errors
///
/// Returns [`ServerError::Validation`] only when the export itself has an
/// unsupported version.
pub async fn import(
    manager: &LifecycleManager,
    request: ImportRequest,
) -> ServerResult<ImportResult> {
    check_version(&request.configuration.version)?;

    let start = Instant::now();
    let item_timeout = manager.settings().import_item_timeout;
    let mut result = ImportResult::default();

    info!(
        items = request.configuration.servers.len(),
        source_namespace = %request.configuration.namespace,
        "Importing server configuration"
    );

    for item in &request.configuration.servers {
        let display_name = item.request.name.clone().unwrap_or_default();
        let resolution = request
            .resolutions
            .get(&display_name)
            .copied()
            .unwrap_or(request.default_resolution);

        let outcome = match tokio::time::timeout(item_timeout, import_item(manager, item, resolution)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ServerError::TransientCluster(GatewayError::Timeout {
                kind: "ImportItem",
                name: display_name.clone(),
                operation: "import",
                timeout_ms: u64::try_from(item_timeout.as_millis()).unwrap_or(u64::MAX),
            })),
        };

        match outcome {
            Ok(ItemOutcome::Created(name)) => result.created.push(name),
            Ok(ItemOutcome::Replaced(name)) => {
                result.created.push(name.clone());
                result.replaced.push(name);
            }
            Ok(ItemOutcome::Renamed { from, to }) => {
                result.created.push(to.clone());
                result.renamed.insert(from, to);
            }
            Ok(ItemOutcome::Skipped(name)) => result.skipped.push(name),
            Err(err) => {
                warn!(
                    name = %display_name,
                    protocol = %item.protocol,
                    reason = err.reason(),
                    error = %err,
                    "Import item failed"
                );
                metrics::record_error(err.reason());
                result.failed.push(ImportFailure {
                    name: display_name,
                    protocol: item.protocol,
                    reason: err.reason().to_string(),
                    error: err.to_string(),
                });
            }
        }
    }

    let status = if result.failed.is_empty() {
        "success"
    } else {
        "error"
    };
    metrics::record_operation("import", "all", status, start.elapsed());
    info!(
        created = result.created.len(),
        replaced = result.replaced.len(),
        renamed = result.renamed.len(),
        skipped = result.skipped.len(),
        failed = result.failed.len(),
        "Import finished"
    );
    Ok(result)
}

/// Accept exports whose major version matches ours
fn check_version(version: &str) -> ServerResult<()> {
    let major = |v: &str| v.split('.').next().unwrap_or_default().trim().to_string();
    if major(version) == major(EXPORT_FORMAT_VERSION) {
        Ok(())
    } else {
        Err(ServerError::validation(format!(
            "unsupported export version '{version}' (expected {EXPORT_FORMAT_VERSION})"
        )))
    }
}

async fn import_item(
    manager: &LifecycleManager,
    item: &ExportedServer,
    resolution: ConflictResolution,
) -> ServerResult<ItemOutcome> {
    let Some(name) = item.request.name.clone().filter(|n| !n.is_empty()) else {
        return Err(ServerError::validation("import item has no name"));
    };

    // Fresh scan per item so earlier items are taken into account
    let current = manager.list_servers().await?;
    let collisions: Vec<&DiscoveredServer> = current
        .iter()
        .filter(|s| {
            (s.protocol == item.protocol && s.name == name)
                || (item.request.node_port.is_some() && s.node_port == item.request.node_port)
        })
        .collect();

    if collisions.is_empty() {
        debug!(name = %name, protocol = %item.protocol, "No collision, creating");
        manager
            .create_server(item.protocol, item.request.clone())
            .await?;
        return Ok(ItemOutcome::Created(name));
    }

    match resolution {
        ConflictResolution::Skip => {
            debug!(name = %name, "Collision, skipping");
            Ok(ItemOutcome::Skipped(name))
        }
        ConflictResolution::Replace => {
            // Refuse before touching anything if any match is static
            for existing in &collisions {
                ensure_dynamic(existing)?;
            }
            for existing in &collisions {
                info!(
                    name = %name,
                    replacing = %existing.resource_name,
                    "Deleting colliding server for replace"
                );
                manager
                    .delete_server(&existing.resource_name, Some(existing.protocol), false)
                    .await?;
            }
            manager
                .create_server(item.protocol, item.request.clone())
                .await?;
            Ok(ItemOutcome::Replaced(name))
        }
        ConflictResolution::Rename => {
            let taken = |candidate: &str| {
                current
                    .iter()
                    .any(|s| s.protocol == item.protocol && s.name == candidate)
            };
            let new_name = (1..=MAX_RENAME_ATTEMPTS)
                .map(|attempt| rename_candidate(&name, attempt))
                .find(|candidate| !taken(candidate))
                .ok_or_else(|| {
                    ServerError::validation(format!("no free rename candidate for '{name}'"))
                })?;

            let mut request = item.request.clone();
            request.name = Some(new_name.clone());
            request.node_port = None;
            manager.create_server(item.protocol, request).await?;
            info!(from = %name, to = %new_name, "Imported server under a new name");
            Ok(ItemOutcome::Renamed {
                from: name,
                to: new_name,
            })
        }
    }
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod transfer_tests;
