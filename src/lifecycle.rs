// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Server lifecycle management.
//!
//! [`LifecycleManager`] creates, deletes, starts, stops and restarts dynamic
//! protocol servers. It holds no state across requests: every operation
//! re-reads the cluster through the discovery classifier, which is the only
//! authority on whether a server may be mutated.
//!
//! # Ordering
//!
//! - Create submits the Deployment, then the NAS `ConfigMap`, then the Service.
//! - Delete removes Services first, then the Deployment (foreground, waiting for
//!   it to disappear), then `ConfigMap`s, then optionally the NAS storage.
//!
//! # Partial failures
//!
//! Multi-object operations are not rolled back. A failure after at least one
//! object was changed surfaces as [`ServerError::PartialFailure`] listing the
//! objects already changed. Deleting the server by name cleans up whatever a
//! failed create left behind.

use crate::blueprints::{
    build_cleanup_pod, build_deployment, build_nas_config_map, build_service, cleanup_pod_name,
    validate_request, OwnershipBinding, ServerPlan,
};
use crate::config::Settings;
use crate::constants::DELETION_POLL_INTERVAL_MILLIS;
use crate::discovery::{self, ensure_dynamic};
use crate::errors::{GatewayError, ServerError, ServerResult};
use crate::gateway::{ClusterGateway, Propagation, KIND_CONFIG_MAP, KIND_DEPLOYMENT, KIND_POD};
use crate::labels::{instance_selector, RESTARTED_AT_ANNOTATION};
use crate::metrics;
use crate::naming;
use crate::protocol::Protocol;
use crate::sync;
use crate::types::{
    DiscoveredServer, LifecycleAction, ServerCreationRequest, ServerStatus,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Orchestrates multi-object server operations against the cluster
#[derive(Clone)]
pub struct LifecycleManager {
    gateway: Arc<dyn ClusterGateway>,
    settings: Arc<Settings>,
    binding: OwnershipBinding,
}

impl LifecycleManager {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        settings: Arc<Settings>,
        binding: OwnershipBinding,
    ) -> Self {
        Self {
            gateway,
            settings,
            binding,
        }
    }

    #[must_use]
    pub fn gateway(&self) -> &dyn ClusterGateway {
        self.gateway.as_ref()
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Every discovered server, dynamic and static
    ///
    /// # Errors
    ///
    /// Returns a cluster error if the scan fails.
    pub async fn list_servers(&self) -> ServerResult<Vec<DiscoveredServer>> {
        discovery::list_servers(self.gateway(), &self.settings).await
    }

    /// One server by resource or logical name
    ///
    /// # Errors
    ///
    /// See [`discovery::find_server`].
    pub async fn find_server(
        &self,
        name: &str,
        protocol: Option<Protocol>,
    ) -> ServerResult<DiscoveredServer> {
        discovery::find_server(self.gateway(), &self.settings, name, protocol).await
    }

    /// Recompute and publish the service discovery document
    ///
    /// # Errors
    ///
    /// See [`sync::rebuild`].
    pub async fn rebuild_document(&self) -> ServerResult<BTreeMap<String, String>> {
        sync::rebuild(self.gateway(), &self.settings).await
    }

    /// Create a dynamic server and republish the discovery document.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Validation`] for a malformed request, before any cluster call
    /// - [`ServerError::Conflict`] when the cluster rejects the name or NodePort
    /// - [`ServerError::PartialFailure`] when a later object failed after the
    ///   Deployment was created
    pub async fn create_server(
        &self,
        protocol: Protocol,
        request: ServerCreationRequest,
    ) -> ServerResult<DiscoveredServer> {
        observe("create", protocol, self.create_server_inner(protocol, request)).await
    }

    async fn create_server_inner(
        &self,
        protocol: Protocol,
        request: ServerCreationRequest,
    ) -> ServerResult<DiscoveredServer> {
        validate_request(protocol, &request)?;
        let identity = naming::allocate(&self.settings.release_name, protocol, &request)?;
        let name = identity.resource_name.clone();
        let plan = ServerPlan {
            settings: &self.settings,
            protocol,
            identity: &identity,
            request: &request,
            binding: &self.binding,
        };

        info!(
            name = %identity.logical_name,
            resource = %name,
            protocol = %protocol,
            node_port = ?identity.node_port,
            "Creating protocol server"
        );

        let mut completed = Vec::new();

        let deployment = self
            .gateway
            .create_deployment(&build_deployment(&plan))
            .await
            .map_err(|e| {
                ServerError::partial(&name, "create", &completed, format!("Deployment/{name}"), e)
            })?;
        completed.push(format!("Deployment/{name}"));
        debug!(name = %name, "Deployment created");

        if let Some(config_map) = build_nas_config_map(&plan) {
            let cm_name = plan.config_map_name();
            self.gateway
                .create_config_map(&config_map)
                .await
                .map_err(|e| {
                    ServerError::partial(&name, "create", &completed, format!("ConfigMap/{cm_name}"), e)
                })?;
            completed.push(format!("ConfigMap/{cm_name}"));
            debug!(name = %name, config_map = %cm_name, "NAS ConfigMap created");
        }

        let service = self
            .gateway
            .create_service(&build_service(&plan))
            .await
            .map_err(|e| {
                ServerError::partial(&name, "create", &completed, format!("Service/{name}"), e)
            })?;
        completed.push(format!("Service/{name}"));
        debug!(name = %name, "Service created");

        self.rebuild_after(&name, "create", &completed).await?;

        let server = discovery::classify(&deployment, Some(&service), &self.settings, Utc::now())
            .ok_or_else(|| ServerError::NotFound(name.clone()))?;
        info!(
            name = %server.name,
            protocol = %protocol,
            node_port = ?server.node_port,
            "Protocol server created"
        );
        Ok(server)
    }

    /// Delete a dynamic server and republish the discovery document.
    ///
    /// With `delete_data` set, NAS servers also lose their storage directory.
    ///
    /// # Errors
    ///
    /// - [`ServerError::NotFound`] when no server matches
    /// - [`ServerError::Protection`] for statically provisioned servers
    /// - [`ServerError::InvalidTransition`] when the server is already being deleted
    /// - [`ServerError::PartialFailure`] when a step failed after an earlier one succeeded
    pub async fn delete_server(
        &self,
        name: &str,
        protocol: Option<Protocol>,
        delete_data: bool,
    ) -> ServerResult<()> {
        let server = self.find_server(name, protocol).await?;
        let protocol = server.protocol;
        observe("delete", protocol, self.delete_server_inner(server, delete_data)).await
    }

    async fn delete_server_inner(
        &self,
        server: DiscoveredServer,
        delete_data: bool,
    ) -> ServerResult<()> {
        ensure_dynamic(&server)?;
        if server.status == ServerStatus::Deleting {
            return Err(ServerError::InvalidTransition {
                name: server.name,
                action: "delete".to_string(),
                state: server.status.to_string(),
            });
        }

        let name = server.resource_name.clone();
        let selector = instance_selector(&name);
        info!(
            name = %server.name,
            resource = %name,
            protocol = %server.protocol,
            delete_data,
            "Deleting protocol server"
        );

        let mut completed = Vec::new();
        let fail = |completed: &[String], step: String, err: GatewayError| {
            ServerError::partial(&name, "delete", completed, step, err)
        };

        let services = self
            .gateway
            .list_services(&selector)
            .await
            .map_err(|e| fail(&completed, format!("Service/{name}"), e))?;
        for service in services {
            let svc_name = service.metadata.name.unwrap_or_default();
            match self.gateway.delete_service(&svc_name).await {
                Ok(()) => completed.push(format!("Service/{svc_name}")),
                Err(e) if e.is_not_found() => {
                    warn!(service = %svc_name, "Service already gone");
                }
                Err(e) => return Err(fail(&completed, format!("Service/{svc_name}"), e)),
            }
        }

        match self
            .gateway
            .delete_deployment(&name, Propagation::Foreground)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => warn!(deployment = %name, "Deployment already gone"),
            Err(e) => return Err(fail(&completed, format!("Deployment/{name}"), e)),
        }
        self.wait_for_deployment_gone(&name)
            .await
            .map_err(|e| fail(&completed, format!("Deployment/{name}"), e))?;
        completed.push(format!("Deployment/{name}"));

        let config_maps = self
            .gateway
            .list_config_maps(&selector)
            .await
            .map_err(|e| fail(&completed, format!("{KIND_CONFIG_MAP}/{name}"), e))?;
        for config_map in config_maps {
            let cm_name = config_map.metadata.name.unwrap_or_default();
            match self.gateway.delete_config_map(&cm_name).await {
                Ok(()) => completed.push(format!("ConfigMap/{cm_name}")),
                Err(e) if e.is_not_found() => {
                    warn!(config_map = %cm_name, "ConfigMap already gone");
                }
                Err(e) => return Err(fail(&completed, format!("ConfigMap/{cm_name}"), e)),
            }
        }

        if delete_data && server.protocol.is_nas() {
            let pod_name = cleanup_pod_name(&name);
            self.cleanup_storage(&name)
                .await
                .map_err(|e| fail(&completed, format!("Pod/{pod_name}"), e))?;
            completed.push(format!("Storage/{name}"));
        } else if delete_data {
            debug!(name = %name, "No isolated storage to delete for non-NAS server");
        }

        self.rebuild_after(&name, "delete", &completed).await?;
        info!(name = %server.name, resource = %name, "Protocol server deleted");
        Ok(())
    }

    /// Start, stop or restart a dynamic server.
    ///
    /// Start and Stop are idempotent. Restart replaces the running pods without
    /// changing the desired replica count.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Protection`] for statically provisioned servers
    /// - [`ServerError::InvalidTransition`] for any action on a deleting server
    ///   and for Restart on a stopped one
    pub async fn set_lifecycle_state(
        &self,
        name: &str,
        protocol: Option<Protocol>,
        action: LifecycleAction,
    ) -> ServerResult<()> {
        let server = self.find_server(name, protocol).await?;
        let protocol = server.protocol;
        observe(
            action.as_str(),
            protocol,
            self.set_lifecycle_state_inner(server, action),
        )
        .await
    }

    async fn set_lifecycle_state_inner(
        &self,
        server: DiscoveredServer,
        action: LifecycleAction,
    ) -> ServerResult<()> {
        ensure_dynamic(&server)?;
        let blocked = match server.status {
            ServerStatus::Deleting => true,
            ServerStatus::Stopped => action == LifecycleAction::Restart,
            _ => false,
        };
        if blocked {
            return Err(ServerError::InvalidTransition {
                name: server.name,
                action: action.to_string(),
                state: server.status.to_string(),
            });
        }

        let name = server.resource_name.clone();
        let step = format!("Deployment/{name}");
        info!(
            name = %server.name,
            resource = %name,
            action = %action,
            status = %server.status,
            "Changing protocol server lifecycle state"
        );

        match action {
            LifecycleAction::Start => self.gateway.scale_deployment(&name, 1).await?,
            LifecycleAction::Stop => self.gateway.scale_deployment(&name, 0).await?,
            LifecycleAction::Restart => {
                let annotations = BTreeMap::from([(
                    RESTARTED_AT_ANNOTATION.to_string(),
                    Utc::now().to_rfc3339(),
                )]);
                self.gateway.annotate_deployment(&name, annotations).await?;

                let pods = self
                    .gateway
                    .list_pods(&instance_selector(&name))
                    .await
                    .map_err(|e| {
                        ServerError::partial(&name, "restart", &[step.clone()], format!("Pod/{name}"), e)
                    })?;
                for pod in pods {
                    let pod_name = pod.metadata.name.unwrap_or_default();
                    match self.gateway.delete_pod(&pod_name).await {
                        Ok(()) => debug!(pod = %pod_name, "Deleted pod for restart"),
                        Err(e) if e.is_not_found() => {}
                        Err(e) => {
                            return Err(ServerError::partial(
                                &name,
                                "restart",
                                &[step.clone()],
                                format!("Pod/{pod_name}"),
                                e,
                            ))
                        }
                    }
                }
            }
        }

        self.rebuild_after(&name, action.as_str(), &[step]).await
    }

    /// Poll until the Deployment no longer exists or the deletion timeout passes
    async fn wait_for_deployment_gone(&self, name: &str) -> Result<(), GatewayError> {
        let timeout = self.settings.deletion_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            if self.gateway.get_deployment(name).await?.is_none() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(GatewayError::Timeout {
                    kind: KIND_DEPLOYMENT,
                    name: name.to_string(),
                    operation: "delete",
                    timeout_ms: millis(timeout),
                });
            }
            debug!(deployment = %name, "Waiting for foreground deletion");
            tokio::time::sleep(Duration::from_millis(DELETION_POLL_INTERVAL_MILLIS)).await;
        }
    }

    /// Run the storage cleanup pod for a NAS server and remove it afterwards
    async fn cleanup_storage(&self, resource_name: &str) -> Result<(), GatewayError> {
        let pod_name = cleanup_pod_name(resource_name);

        // Leftover from an earlier failed attempt
        if self.gateway.get_pod(&pod_name).await?.is_some() {
            match self.gateway.delete_pod(&pod_name).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let pod = build_cleanup_pod(&self.settings, resource_name, &self.binding);
        self.gateway.create_pod(&pod).await?;
        info!(pod = %pod_name, path = %resource_name, "Started storage cleanup pod");

        let outcome = self.wait_for_pod_completion(&pod_name).await;

        if let Err(e) = self.gateway.delete_pod(&pod_name).await {
            if !e.is_not_found() {
                warn!(pod = %pod_name, error = %e, "Failed to delete storage cleanup pod");
            }
        }
        outcome
    }

    async fn wait_for_pod_completion(&self, pod_name: &str) -> Result<(), GatewayError> {
        let timeout = self.settings.deletion_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            let phase = self
                .gateway
                .get_pod(pod_name)
                .await?
                .and_then(|pod| pod.status)
                .and_then(|status| status.phase);
            match phase.as_deref() {
                Some("Succeeded") => return Ok(()),
                Some("Failed") => {
                    return Err(GatewayError::Rejected {
                        kind: KIND_POD,
                        name: pod_name.to_string(),
                        operation: "cleanup",
                        code: 500,
                        message: "storage cleanup pod finished in phase Failed".to_string(),
                    })
                }
                _ => {}
            }
            if Instant::now() >= deadline {
                return Err(GatewayError::Timeout {
                    kind: KIND_POD,
                    name: pod_name.to_string(),
                    operation: "cleanup",
                    timeout_ms: millis(timeout),
                });
            }
            tokio::time::sleep(Duration::from_millis(DELETION_POLL_INTERVAL_MILLIS)).await;
        }
    }

    /// Republish the discovery document after a successful mutation.
    ///
    /// The mutation already happened, so a failure here is partial.
    async fn rebuild_after(
        &self,
        name: &str,
        operation: &str,
        completed: &[String],
    ) -> ServerResult<()> {
        match self.rebuild_document().await {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(name = %name, operation, error = %err, "Discovery document rebuild failed");
                Err(ServerError::PartialFailure {
                    name: name.to_string(),
                    operation: operation.to_string(),
                    completed: completed.to_vec(),
                    failed_step: format!("ConfigMap/{}", self.settings.discovery_config_map),
                    message: err.to_string(),
                })
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Record outcome and duration of an operation
async fn observe<T>(
    operation: &str,
    protocol: Protocol,
    fut: impl Future<Output = ServerResult<T>>,
) -> ServerResult<T> {
    let start = Instant::now();
    let result = fut.await;
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_operation(operation, protocol.as_str(), status, start.elapsed());
    if let Err(err) = &result {
        metrics::record_error(err.reason());
        warn!(operation, protocol = %protocol, reason = err.reason(), error = %err, "Operation failed");
    }
    result
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod lifecycle_tests;
