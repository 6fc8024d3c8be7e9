// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service discovery document synchronization.
//!
//! The document is a single `ConfigMap` mapping `{PROTOCOL}_{NAME}` keys to
//! endpoints. It is always recomputed from a fresh scan and written with a
//! resource-version guarded replace. A stale-version conflict retries the
//! whole rebuild once; a second conflict is surfaced.

use crate::blueprints::blueprint;
use crate::config::Settings;
use crate::discovery::list_servers;
use crate::errors::{GatewayError, ServerResult};
use crate::gateway::ClusterGateway;
use crate::labels::{
    COMPONENT_SERVICE_DISCOVERY, GENERATED_AT_ANNOTATION, K8S_COMPONENT, K8S_MANAGED_BY,
    K8S_PART_OF, MANAGED_BY_CONTROL_API, PART_OF_TRANSFERSIM,
};
use crate::metrics;
use crate::protocol::Protocol;
use crate::types::DiscoveredServer;
use chrono::Utc;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Total write attempts per rebuild
const MAX_REBUILD_ATTEMPTS: u32 = 2;

/// Document key for a server: `{PROTOCOL}_{NAME}` with `-` replaced by `_`
#[must_use]
pub fn entry_key(protocol: Protocol, name: &str) -> String {
    format!(
        "{}_{}",
        protocol.key_prefix(),
        name.to_ascii_uppercase().replace('-', "_")
    )
}

/// Compute the document for a set of servers.
///
/// Servers without a Service have no endpoint and are left out.
#[must_use]
pub fn build_document(servers: &[DiscoveredServer]) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    for server in servers {
        let (Some(endpoint), Some(host), Some(port)) =
            (server.endpoint(), server.dns_name.clone(), server.port)
        else {
            continue;
        };
        let key = entry_key(server.protocol, &server.name);
        data.insert(format!("{key}_HOST"), host);
        data.insert(format!("{key}_PORT"), port.to_string());
        if let Some(node_port) = server.node_port {
            data.insert(format!("{key}_NODE_PORT"), node_port.to_string());
        }
        if let Some(path) = blueprint(server.protocol).data_mount_path {
            data.insert(format!("{key}_PATH"), path.to_string());
        }
        data.insert(key, endpoint);
    }
    data
}

/// Compute the document from a fresh scan without publishing it
///
/// # Errors
///
/// Returns a cluster error if the scan fails.
pub async fn current_document(
    gateway: &dyn ClusterGateway,
    settings: &Settings,
) -> ServerResult<BTreeMap<String, String>> {
    let servers = list_servers(gateway, settings).await?;
    Ok(build_document(&servers))
}

/// Recompute and publish the document.
///
/// # Errors
///
/// Returns an error if the scan fails, or if the write fails for any reason
/// other than a single stale-version conflict.
pub async fn rebuild(
    gateway: &dyn ClusterGateway,
    settings: &Settings,
) -> ServerResult<BTreeMap<String, String>> {
    let mut attempt = 1;
    loop {
        let data = match current_document(gateway, settings).await {
            Ok(data) => data,
            Err(err) => {
                metrics::record_rebuild("error");
                return Err(err);
            }
        };

        match publish(gateway, settings, &data).await {
            Ok(()) => {
                metrics::record_rebuild("success");
                info!(
                    config_map = %settings.discovery_config_map,
                    entries = data.len(),
                    attempt,
                    "Published service discovery document"
                );
                return Ok(data);
            }
            Err(err @ (GatewayError::StaleVersion { .. } | GatewayError::AlreadyExists { .. }))
                if attempt < MAX_REBUILD_ATTEMPTS =>
            {
                metrics::record_rebuild("retried");
                warn!(
                    config_map = %settings.discovery_config_map,
                    error = %err,
                    "Discovery document changed concurrently, rebuilding once more"
                );
                attempt += 1;
            }
            Err(err) => {
                metrics::record_rebuild("error");
                return Err(err.into());
            }
        }
    }
}

/// Create the document, or replace it guarded by the version just read
async fn publish(
    gateway: &dyn ClusterGateway,
    settings: &Settings,
    data: &BTreeMap<String, String>,
) -> Result<(), GatewayError> {
    let name = &settings.discovery_config_map;
    let generated_at = Utc::now().to_rfc3339();

    match gateway.get_config_map(name).await? {
        None => {
            debug!(config_map = %name, "Creating service discovery document");
            let config_map = ConfigMap {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    namespace: Some(settings.namespace.clone()),
                    labels: Some(BTreeMap::from([
                        (K8S_COMPONENT.to_string(), COMPONENT_SERVICE_DISCOVERY.to_string()),
                        (K8S_PART_OF.to_string(), PART_OF_TRANSFERSIM.to_string()),
                        (K8S_MANAGED_BY.to_string(), MANAGED_BY_CONTROL_API.to_string()),
                    ])),
                    annotations: Some(BTreeMap::from([(
                        GENERATED_AT_ANNOTATION.to_string(),
                        generated_at,
                    )])),
                    ..Default::default()
                },
                data: Some(data.clone()),
                ..Default::default()
            };
            gateway.create_config_map(&config_map).await?;
        }
        Some(mut existing) => {
            debug!(
                config_map = %name,
                resource_version = ?existing.metadata.resource_version,
                "Replacing service discovery document"
            );
            existing
                .metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(GENERATED_AT_ANNOTATION.to_string(), generated_at);
            existing.data = Some(data.clone());
            gateway.replace_config_map(&existing).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod sync_tests;
