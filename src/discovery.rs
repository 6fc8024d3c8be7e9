// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Discovery and protection classification.
//!
//! Every call re-reads the cluster: Deployments and Services carrying the
//! protocol label are listed concurrently. A Service belongs to the
//! Deployment whose pod template labels satisfy its selector.
//! Ownership is taken from the `app.kubernetes.io/managed-by` label only,
//! never from resource names, and this module is the single authority the
//! lifecycle manager consults before mutating a server.

use crate::blueprints::recover_request;
use crate::config::Settings;
use crate::constants::{RESTART_GRACE_SECS, VOLUME_NAS_DATA};
use crate::errors::{ServerError, ServerResult};
use crate::gateway::ClusterGateway;
use crate::labels::{
    K8S_MANAGED_BY, MANAGED_BY_CONTROL_API, MANAGED_BY_UNKNOWN, PROTOCOL_LABEL,
    PROTOCOL_SERVER_SELECTOR, RESTARTED_AT_ANNOTATION, SERVER_CONFIG_ANNOTATION,
    SERVER_NAME_LABEL, STORAGE_SUBPATH_ANNOTATION,
};
use crate::metrics;
use crate::protocol::Protocol;
use crate::types::{DiscoveredServer, ServerCreationRequest, ServerStatus};
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Scan the cluster and classify every protocol server.
///
/// Results are sorted by protocol then name.
///
/// # Errors
///
/// Returns a cluster error if either list call fails.
pub async fn list_servers(
    gateway: &dyn ClusterGateway,
    settings: &Settings,
) -> ServerResult<Vec<DiscoveredServer>> {
    let (deployments, services) = futures::try_join!(
        gateway.list_deployments(PROTOCOL_SERVER_SELECTOR),
        gateway.list_services(PROTOCOL_SERVER_SELECTOR),
    )?;

    let now = Utc::now();
    let mut servers: Vec<DiscoveredServer> = deployments
        .iter()
        .filter_map(|deployment| {
            classify(
                deployment,
                service_for(deployment, &services),
                settings,
                now,
            )
        })
        .collect();
    servers.sort_by(|a, b| (a.protocol, &a.name).cmp(&(b.protocol, &b.name)));

    debug!(
        deployments = deployments.len(),
        services = services.len(),
        servers = servers.len(),
        "Discovered protocol servers"
    );
    metrics::record_discovered_servers(&servers);
    Ok(servers)
}

/// Resolve one server by resource name, then by logical name.
///
/// # Errors
///
/// Returns [`ServerError::NotFound`] when nothing matches and
/// [`ServerError::Validation`] when a logical name matches servers of several
/// protocols and no protocol was given.
pub async fn find_server(
    gateway: &dyn ClusterGateway,
    settings: &Settings,
    name: &str,
    protocol: Option<Protocol>,
) -> ServerResult<DiscoveredServer> {
    let servers = list_servers(gateway, settings).await?;
    resolve(servers, name, protocol)
}

/// Pick one server out of a scan by name
///
/// # Errors
///
/// See [`find_server`].
pub fn resolve(
    servers: Vec<DiscoveredServer>,
    name: &str,
    protocol: Option<Protocol>,
) -> ServerResult<DiscoveredServer> {
    let protocol_matches = |server: &DiscoveredServer| protocol.is_none_or(|p| server.protocol == p);

    if let Some(server) = servers
        .iter()
        .find(|s| s.resource_name == name && protocol_matches(s))
    {
        return Ok(server.clone());
    }

    let mut matches: Vec<DiscoveredServer> = servers
        .into_iter()
        .filter(|s| s.name == name && protocol_matches(s))
        .collect();
    match matches.len() {
        0 => Err(ServerError::NotFound(name.to_string())),
        1 => Ok(matches.remove(0)),
        _ => {
            let protocols: Vec<&str> = matches.iter().map(|s| s.protocol.as_str()).collect();
            Err(ServerError::validation(format!(
                "server name '{name}' is ambiguous across protocols [{}]; specify ?protocol=",
                protocols.join(", ")
            )))
        }
    }
}

/// Reject mutation of any server not owned by the control API
///
/// # Errors
///
/// Returns [`ServerError::Protection`] for statically provisioned servers.
pub fn ensure_dynamic(server: &DiscoveredServer) -> ServerResult<()> {
    if server.is_dynamic {
        Ok(())
    } else {
        Err(ServerError::Protection {
            name: server.name.clone(),
            managed_by: server.managed_by.clone(),
        })
    }
}

/// Whether a Service selector routes to pods carrying `pod_labels`.
///
/// An empty or missing selector selects nothing.
#[must_use]
pub fn selector_matches(
    selector: Option<&BTreeMap<String, String>>,
    pod_labels: &BTreeMap<String, String>,
) -> bool {
    selector.is_some_and(|selector| {
        !selector.is_empty()
            && selector
                .iter()
                .all(|(key, value)| pod_labels.get(key) == Some(value))
    })
}

/// The Service exposing a Deployment's pods.
///
/// When several Services select the pods, the one whose name equals the
/// Deployment's wins, then the most specific selector.
fn service_for<'a>(deployment: &Deployment, services: &'a [Service]) -> Option<&'a Service> {
    let pod_labels = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.metadata.as_ref())
        .and_then(|meta| meta.labels.as_ref())?;

    services
        .iter()
        .filter(|svc| {
            selector_matches(
                svc.spec.as_ref().and_then(|spec| spec.selector.as_ref()),
                pod_labels,
            )
        })
        .max_by_key(|svc| {
            let same_name = svc.metadata.name == deployment.metadata.name;
            let specificity = svc
                .spec
                .as_ref()
                .and_then(|spec| spec.selector.as_ref())
                .map_or(0, BTreeMap::len);
            (same_name, specificity)
        })
}

/// Build a [`DiscoveredServer`] from a Deployment and its Service.
///
/// Returns `None` when the Deployment has no recognizable protocol label.
#[must_use]
pub fn classify(
    deployment: &Deployment,
    service: Option<&Service>,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Option<DiscoveredServer> {
    let meta = &deployment.metadata;
    let resource_name = meta.name.clone()?;
    let labels = meta.labels.clone().unwrap_or_default();
    let annotations = meta.annotations.clone().unwrap_or_default();

    let protocol = match labels.get(PROTOCOL_LABEL).map(|p| p.parse::<Protocol>()) {
        Some(Ok(protocol)) => protocol,
        Some(Err(err)) => {
            debug!(name = %resource_name, error = %err, "Skipping Deployment with unknown protocol");
            return None;
        }
        None => return None,
    };

    let managed_by = labels
        .get(K8S_MANAGED_BY)
        .cloned()
        .unwrap_or_else(|| MANAGED_BY_UNKNOWN.to_string());
    let is_dynamic = managed_by == MANAGED_BY_CONTROL_API;

    let name = labels
        .get(SERVER_NAME_LABEL)
        .cloned()
        .unwrap_or_else(|| display_name(&resource_name, &settings.release_name, protocol));

    let first_port = service
        .and_then(|svc| svc.spec.as_ref())
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| ports.first());
    let service_name = service.and_then(|svc| svc.metadata.name.clone());

    let replicas = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready_replicas = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);

    let storage_subpath = annotations
        .get(STORAGE_SUBPATH_ANNOTATION)
        .cloned()
        .or_else(|| nas_mount_subpath(deployment));
    let node_port = first_port.and_then(|p| p.node_port);

    let config = server_config(deployment, protocol, is_dynamic, &name, node_port);

    Some(DiscoveredServer {
        name,
        protocol,
        resource_name,
        dns_name: service_name.as_deref().map(|svc| settings.service_dns_name(svc)),
        service_name,
        port: first_port.map(|p| p.port),
        node_port,
        cluster_ip: service
            .and_then(|svc| svc.spec.as_ref())
            .and_then(|spec| spec.cluster_ip.clone()),
        is_dynamic,
        managed_by,
        status: derive_status(deployment, now),
        replicas,
        ready_replicas,
        storage_subpath,
        created_at: meta.creation_timestamp.as_ref().and_then(to_chrono),
        config,
    })
}

/// Lifecycle state of a server as seen on its Deployment
#[must_use]
pub fn derive_status(deployment: &Deployment, now: DateTime<Utc>) -> ServerStatus {
    if deployment.metadata.deletion_timestamp.is_some() {
        return ServerStatus::Deleting;
    }
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    if desired == 0 {
        return ServerStatus::Stopped;
    }
    let ready = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    if ready >= 1 {
        return ServerStatus::Running;
    }

    let restarted_recently = deployment
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(RESTARTED_AT_ANNOTATION))
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .is_some_and(|ts| (now - ts.with_timezone(&Utc)).num_seconds() <= RESTART_GRACE_SECS);
    if restarted_recently {
        ServerStatus::Restarting
    } else {
        ServerStatus::Creating
    }
}

/// Strip `{release}-{protocol}-` from a resource name when present
fn display_name(resource_name: &str, release_name: &str, protocol: Protocol) -> String {
    let prefix = format!("{release_name}-{protocol}-");
    resource_name
        .strip_prefix(&prefix)
        .filter(|rest| !rest.is_empty())
        .unwrap_or(resource_name)
        .to_string()
}

fn nas_mount_subpath(deployment: &Deployment) -> Option<String> {
    deployment
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .iter()
        .flat_map(|c| c.volume_mounts.iter().flatten())
        .find(|m| m.name == VOLUME_NAS_DATA)
        .and_then(|m| m.sub_path.clone())
}

/// Creation request able to reproduce this server.
///
/// Dynamic servers carry it in an annotation. Static servers, and dynamic ones
/// whose annotation is unreadable, are recovered from the container environment.
fn server_config(
    deployment: &Deployment,
    protocol: Protocol,
    is_dynamic: bool,
    name: &str,
    node_port: Option<i32>,
) -> Option<ServerCreationRequest> {
    if is_dynamic {
        let stored = deployment
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(SERVER_CONFIG_ANNOTATION));
        if let Some(raw) = stored {
            match serde_json::from_str::<ServerCreationRequest>(raw) {
                Ok(mut request) => {
                    request.name = Some(name.to_string());
                    request.node_port = request.node_port.or(node_port);
                    return Some(request);
                }
                Err(err) => warn!(
                    name = %name,
                    error = %err,
                    "Unreadable server-config annotation, recovering from environment"
                ),
            }
        }
    }

    let env = deployment
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .first()?
        .env
        .clone()
        .unwrap_or_default();
    Some(recover_request(protocol, &env, name, node_port))
}

/// Convert a Kubernetes timestamp through its RFC 3339 wire form
fn to_chrono<T: serde::Serialize>(time: &T) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(time).ok()?;
    DateTime::parse_from_rfc3339(value.as_str()?)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod discovery_tests;
