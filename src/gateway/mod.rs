// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster object gateway.
//!
//! A thin, typed boundary around the Kubernetes API for the four object kinds the
//! control plane touches: `Deployment`, `Service`, `ConfigMap` and `Pod`. It holds
//! no business logic. Every call is bound to one namespace and carries its own
//! timeout, surfaced as [`GatewayError::Timeout`](crate::errors::GatewayError::Timeout).
//!
//! The trait exists so lifecycle, discovery and import logic can be exercised
//! against an in-memory cluster in tests.

pub mod kubernetes;

#[cfg(test)]
pub mod memory;

use crate::errors::GatewayResult;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use std::collections::BTreeMap;

pub use self::kubernetes::KubeGateway;

/// Object kind names used in errors and logs
pub const KIND_DEPLOYMENT: &str = "Deployment";
pub const KIND_SERVICE: &str = "Service";
pub const KIND_CONFIG_MAP: &str = "ConfigMap";
pub const KIND_POD: &str = "Pod";

/// Deletion propagation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Delete dependents in the background after the owner is gone
    Background,
    /// Keep the owner until every dependent with `blockOwnerDeletion` is gone
    Foreground,
}

/// Namespaced create/read/update/delete for the object kinds servers are built from.
///
/// `get_*` returns `Ok(None)` for a missing object. `delete_*` returns
/// [`GatewayError::NotFound`](crate::errors::GatewayError::NotFound) so callers
/// decide whether absence is acceptable.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Namespace every call is bound to
    fn namespace(&self) -> &str;

    async fn create_deployment(&self, deployment: &Deployment) -> GatewayResult<Deployment>;
    async fn get_deployment(&self, name: &str) -> GatewayResult<Option<Deployment>>;
    async fn list_deployments(&self, selector: &str) -> GatewayResult<Vec<Deployment>>;
    /// Set the desired replica count through the scale subresource
    async fn scale_deployment(&self, name: &str, replicas: i32) -> GatewayResult<()>;
    /// Merge the given annotations into the Deployment's metadata
    async fn annotate_deployment(
        &self,
        name: &str,
        annotations: BTreeMap<String, String>,
    ) -> GatewayResult<()>;
    async fn delete_deployment(&self, name: &str, propagation: Propagation) -> GatewayResult<()>;

    async fn create_service(&self, service: &Service) -> GatewayResult<Service>;
    async fn list_services(&self, selector: &str) -> GatewayResult<Vec<Service>>;
    async fn delete_service(&self, name: &str) -> GatewayResult<()>;

    async fn create_config_map(&self, config_map: &ConfigMap) -> GatewayResult<ConfigMap>;
    async fn get_config_map(&self, name: &str) -> GatewayResult<Option<ConfigMap>>;
    /// Replace a ConfigMap, guarded by `metadata.resourceVersion` when it is set
    async fn replace_config_map(&self, config_map: &ConfigMap) -> GatewayResult<ConfigMap>;
    async fn list_config_maps(&self, selector: &str) -> GatewayResult<Vec<ConfigMap>>;
    async fn delete_config_map(&self, name: &str) -> GatewayResult<()>;

    async fn create_pod(&self, pod: &Pod) -> GatewayResult<Pod>;
    async fn get_pod(&self, name: &str) -> GatewayResult<Option<Pod>>;
    async fn list_pods(&self, selector: &str) -> GatewayResult<Vec<Pod>>;
    async fn delete_pod(&self, name: &str) -> GatewayResult<()>;
}
