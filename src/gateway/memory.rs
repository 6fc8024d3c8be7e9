// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`ClusterGateway`] for unit tests.
//!
//! Simulates the API server behaviour the control plane depends on:
//! - `AlreadyExists` on duplicate names
//! - NodePort validation and allocation (30000-32767), `PortAllocated` on collision
//! - resource versions with `StaleVersion` on a stale `ConfigMap` replace
//! - a Deployment controller that keeps `spec.replicas` pods alive
//! - owner-reference cascade from Deployments to their pods
//! - NAS storage subpaths created by mounts and removed by cleanup pods
//! - one-shot failure and delay injection per (kind, operation)

use super::{
    ClusterGateway, Propagation, KIND_CONFIG_MAP, KIND_DEPLOYMENT, KIND_POD, KIND_SERVICE,
};
use crate::constants::{NODE_PORT_MAX, NODE_PORT_MIN, VOLUME_NAS_DATA};
use crate::errors::{GatewayError, GatewayResult};
use crate::labels::CLEANUP_PATH_ANNOTATION;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, PodStatus, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct State {
    deployments: BTreeMap<String, Deployment>,
    services: BTreeMap<String, Service>,
    config_maps: BTreeMap<String, ConfigMap>,
    pods: BTreeMap<String, Pod>,
    storage: BTreeSet<String>,
    failures: Vec<(&'static str, &'static str, GatewayError)>,
    delays: Vec<(&'static str, &'static str, Duration)>,
    calls: Vec<String>,
    next_version: u64,
    next_pod: u64,
    next_ip: u32,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn take_failure(&mut self, kind: &str, operation: &str) -> GatewayResult<()> {
        if let Some(idx) = self
            .failures
            .iter()
            .position(|(k, op, _)| *k == kind && *op == operation)
        {
            let (_, _, err) = self.failures.remove(idx);
            return Err(err);
        }
        Ok(())
    }

    fn take_delay(&mut self, kind: &str, operation: &str) -> Option<Duration> {
        let idx = self
            .delays
            .iter()
            .position(|(k, op, _)| *k == kind && *op == operation)?;
        Some(self.delays.remove(idx).2)
    }

    fn allocated_node_ports(&self) -> BTreeSet<i32> {
        self.services
            .values()
            .filter_map(|svc| svc.spec.as_ref())
            .filter_map(|spec| spec.ports.as_ref())
            .flatten()
            .filter_map(|port| port.node_port)
            .collect()
    }

    /// Bring the pod count of a Deployment to its desired replica count
    fn reconcile_pods(&mut self, deployment_name: &str) {
        let Some(deployment) = self.deployments.get(deployment_name).cloned() else {
            return;
        };
        let desired = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1)
            .max(0) as usize;
        let owned: Vec<String> = self
            .pods
            .iter()
            .filter(|(_, pod)| owned_by(pod, deployment_name))
            .map(|(name, _)| name.clone())
            .collect();

        if owned.len() > desired {
            for name in owned.iter().skip(desired) {
                self.pods.remove(name);
            }
        }
        for _ in owned.len()..desired {
            self.next_pod += 1;
            let pod_name = format!("{deployment_name}-{:05}", self.next_pod);
            let labels = deployment
                .spec
                .as_ref()
                .and_then(|s| s.template.metadata.as_ref())
                .and_then(|m| m.labels.clone());
            let resource_version = self.bump();
            self.pods.insert(
                pod_name.clone(),
                Pod {
                    metadata: ObjectMeta {
                        name: Some(pod_name),
                        labels,
                        resource_version: Some(resource_version),
                        owner_references: Some(vec![OwnerReference {
                            api_version: "apps/v1".to_string(),
                            kind: KIND_DEPLOYMENT.to_string(),
                            name: deployment_name.to_string(),
                            uid: deployment.metadata.uid.clone().unwrap_or_default(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    },
                    status: Some(PodStatus {
                        phase: Some("Running".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            );
        }

        let replicas = i32::try_from(desired).unwrap_or(i32::MAX);
        if let Some(stored) = self.deployments.get_mut(deployment_name) {
            stored.status = Some(DeploymentStatus {
                replicas: Some(replicas),
                ready_replicas: Some(replicas),
                available_replicas: Some(replicas),
                ..Default::default()
            });
        }
    }
}

fn owned_by(pod: &Pod, owner: &str) -> bool {
    pod.metadata
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.name == owner))
}

/// Match a label selector of the form `key`, `key=value`, comma separated
fn matches(selector: &str, labels: Option<&BTreeMap<String, String>>) -> bool {
    let empty = BTreeMap::new();
    let labels = labels.unwrap_or(&empty);
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).is_some_and(|v| v == value),
            None => labels.contains_key(term),
        })
}

fn name_of(meta: &ObjectMeta) -> String {
    meta.name.clone().unwrap_or_default()
}

/// In-memory cluster bound to one namespace
pub struct MemoryGateway {
    namespace: String,
    state: Mutex<State>,
}

impl MemoryGateway {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("memory gateway lock poisoned")
    }

    /// Make the next `operation` on `kind` fail with `error`
    pub fn fail_next(&self, kind: &'static str, operation: &'static str, error: GatewayError) {
        self.state().failures.push((kind, operation, error));
    }

    /// Make the next `operation` on `kind` stall for `delay` before running
    pub fn delay_next(&self, kind: &'static str, operation: &'static str, delay: Duration) {
        self.state().delays.push((kind, operation, delay));
    }

    async fn pause(&self, kind: &str, operation: &str) {
        let delay = self.state().take_delay(kind, operation);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Mutating calls in order, as `operation Kind/name`
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn deployment(&self, name: &str) -> Option<Deployment> {
        self.state().deployments.get(name).cloned()
    }

    pub fn service(&self, name: &str) -> Option<Service> {
        self.state().services.get(name).cloned()
    }

    pub fn config_map(&self, name: &str) -> Option<ConfigMap> {
        self.state().config_maps.get(name).cloned()
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.state().pods.keys().cloned().collect()
    }

    pub fn storage_paths(&self) -> Vec<String> {
        self.state().storage.iter().cloned().collect()
    }

    /// Names of every object of every kind, for whole-cluster comparisons
    pub fn object_names(&self) -> Vec<String> {
        let state = self.state();
        let mut names = Vec::new();
        names.extend(state.deployments.keys().map(|n| format!("Deployment/{n}")));
        names.extend(state.services.keys().map(|n| format!("Service/{n}")));
        names.extend(state.config_maps.keys().map(|n| format!("ConfigMap/{n}")));
        names.extend(state.pods.keys().map(|n| format!("Pod/{n}")));
        names
    }

    /// Seed a Deployment without going through the create path
    pub fn insert_deployment(&self, deployment: Deployment) {
        let mut state = self.state();
        let name = name_of(&deployment.metadata);
        state.deployments.insert(name.clone(), deployment);
        state.reconcile_pods(&name);
    }

    /// Seed a Service without going through the create path
    pub fn insert_service(&self, service: Service) {
        let name = name_of(&service.metadata);
        self.state().services.insert(name, service);
    }

    /// Mark a Deployment as being deleted (deletion timestamp set, finalizers pending)
    pub fn mark_deleting(&self, name: &str) {
        let mut state = self.state();
        if let Some(deployment) = state.deployments.get_mut(name) {
            deployment.metadata.deletion_timestamp =
                serde_json::from_value(serde_json::json!("2025-01-01T00:00:00Z")).ok();
        }
    }

    /// Override the ready replica count reported in a Deployment's status
    pub fn set_ready_replicas(&self, name: &str, ready: i32) {
        let mut state = self.state();
        if let Some(status) = state
            .deployments
            .get_mut(name)
            .and_then(|d| d.status.as_mut())
        {
            status.ready_replicas = Some(ready);
        }
    }
}

#[async_trait]
impl ClusterGateway for MemoryGateway {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn create_deployment(&self, deployment: &Deployment) -> GatewayResult<Deployment> {
        self.pause(KIND_DEPLOYMENT, "create").await;
        let mut state = self.state();
        state.take_failure(KIND_DEPLOYMENT, "create")?;
        let name = name_of(&deployment.metadata);
        if state.deployments.contains_key(&name) {
            return Err(GatewayError::AlreadyExists {
                kind: KIND_DEPLOYMENT,
                name,
            });
        }

        let mut stored = deployment.clone();
        stored.metadata.namespace = Some(self.namespace.clone());
        stored.metadata.uid = Some(format!("uid-deployment-{name}"));
        stored.metadata.resource_version = Some(state.bump());

        let subpaths: Vec<String> = stored
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .map(|pod| {
                pod.containers
                    .iter()
                    .flat_map(|c| c.volume_mounts.clone().unwrap_or_default())
                    .filter(|m| m.name == VOLUME_NAS_DATA)
                    .filter_map(|m| m.sub_path)
                    .collect()
            })
            .unwrap_or_default();
        state.storage.extend(subpaths);

        state.calls.push(format!("create Deployment/{name}"));
        state.deployments.insert(name.clone(), stored);
        state.reconcile_pods(&name);
        Ok(state.deployments[&name].clone())
    }

    async fn get_deployment(&self, name: &str) -> GatewayResult<Option<Deployment>> {
        let mut state = self.state();
        state.take_failure(KIND_DEPLOYMENT, "get")?;
        Ok(state.deployments.get(name).cloned())
    }

    async fn list_deployments(&self, selector: &str) -> GatewayResult<Vec<Deployment>> {
        let mut state = self.state();
        state.take_failure(KIND_DEPLOYMENT, "list")?;
        Ok(state
            .deployments
            .values()
            .filter(|d| matches(selector, d.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }

    async fn scale_deployment(&self, name: &str, replicas: i32) -> GatewayResult<()> {
        let mut state = self.state();
        state.take_failure(KIND_DEPLOYMENT, "scale")?;
        let version = state.bump();
        let deployment = state
            .deployments
            .get_mut(name)
            .ok_or_else(|| GatewayError::NotFound {
                kind: KIND_DEPLOYMENT,
                name: name.to_string(),
            })?;
        if let Some(spec) = deployment.spec.as_mut() {
            spec.replicas = Some(replicas);
        }
        deployment.metadata.resource_version = Some(version);
        state.calls.push(format!("scale Deployment/{name}={replicas}"));
        state.reconcile_pods(name);
        Ok(())
    }

    async fn annotate_deployment(
        &self,
        name: &str,
        annotations: BTreeMap<String, String>,
    ) -> GatewayResult<()> {
        let mut state = self.state();
        state.take_failure(KIND_DEPLOYMENT, "annotate")?;
        let deployment = state
            .deployments
            .get_mut(name)
            .ok_or_else(|| GatewayError::NotFound {
                kind: KIND_DEPLOYMENT,
                name: name.to_string(),
            })?;
        deployment
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations);
        state.calls.push(format!("annotate Deployment/{name}"));
        Ok(())
    }

    async fn delete_deployment(&self, name: &str, propagation: Propagation) -> GatewayResult<()> {
        let mut state = self.state();
        state.take_failure(KIND_DEPLOYMENT, "delete")?;
        if state.deployments.remove(name).is_none() {
            return Err(GatewayError::NotFound {
                kind: KIND_DEPLOYMENT,
                name: name.to_string(),
            });
        }
        state.pods.retain(|_, pod| !owned_by(pod, name));
        let policy = match propagation {
            Propagation::Foreground => "foreground",
            Propagation::Background => "background",
        };
        state
            .calls
            .push(format!("delete Deployment/{name} ({policy})"));
        Ok(())
    }

    async fn create_service(&self, service: &Service) -> GatewayResult<Service> {
        self.pause(KIND_SERVICE, "create").await;
        let mut state = self.state();
        state.take_failure(KIND_SERVICE, "create")?;
        let name = name_of(&service.metadata);
        if state.services.contains_key(&name) {
            return Err(GatewayError::AlreadyExists {
                kind: KIND_SERVICE,
                name,
            });
        }

        let mut stored = service.clone();
        let mut allocated = state.allocated_node_ports();
        let is_node_port = stored
            .spec
            .as_ref()
            .and_then(|s| s.type_.as_deref())
            .is_some_and(|t| t == "NodePort");

        if let Some(ports) = stored.spec.as_mut().and_then(|s| s.ports.as_mut()) {
            for port in ports.iter_mut().filter(|_| is_node_port) {
                match port.node_port {
                    Some(requested) if !(NODE_PORT_MIN..=NODE_PORT_MAX).contains(&requested) => {
                        return Err(GatewayError::Rejected {
                            kind: KIND_SERVICE,
                            name,
                            operation: "create",
                            code: 422,
                            message: format!(
                                "spec.ports[0].nodePort: Invalid value: {requested}: provided port is not in the valid range"
                            ),
                        });
                    }
                    Some(requested) if allocated.contains(&requested) => {
                        return Err(GatewayError::PortAllocated {
                            kind: KIND_SERVICE,
                            name,
                            message: format!(
                                "spec.ports[0].nodePort: Invalid value: {requested}: provided port is already allocated"
                            ),
                        });
                    }
                    Some(requested) => {
                        allocated.insert(requested);
                    }
                    None => {
                        let free = (NODE_PORT_MIN..=NODE_PORT_MAX)
                            .find(|p| !allocated.contains(p))
                            .ok_or_else(|| GatewayError::Rejected {
                                kind: KIND_SERVICE,
                                name: name.clone(),
                                operation: "create",
                                code: 422,
                                message: "range of valid ports is exhausted".to_string(),
                            })?;
                        allocated.insert(free);
                        port.node_port = Some(free);
                    }
                }
            }
        }

        state.next_ip += 1;
        let ip = format!("10.96.0.{}", state.next_ip);
        if let Some(spec) = stored.spec.as_mut() {
            spec.cluster_ip = Some(ip);
        }
        stored.metadata.namespace = Some(self.namespace.clone());
        stored.metadata.resource_version = Some(state.bump());
        state.calls.push(format!("create Service/{name}"));
        state.services.insert(name, stored.clone());
        Ok(stored)
    }

    async fn list_services(&self, selector: &str) -> GatewayResult<Vec<Service>> {
        let mut state = self.state();
        state.take_failure(KIND_SERVICE, "list")?;
        Ok(state
            .services
            .values()
            .filter(|s| matches(selector, s.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }

    async fn delete_service(&self, name: &str) -> GatewayResult<()> {
        let mut state = self.state();
        state.take_failure(KIND_SERVICE, "delete")?;
        if state.services.remove(name).is_none() {
            return Err(GatewayError::NotFound {
                kind: KIND_SERVICE,
                name: name.to_string(),
            });
        }
        state.calls.push(format!("delete Service/{name}"));
        Ok(())
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> GatewayResult<ConfigMap> {
        let mut state = self.state();
        state.take_failure(KIND_CONFIG_MAP, "create")?;
        let name = name_of(&config_map.metadata);
        if state.config_maps.contains_key(&name) {
            return Err(GatewayError::AlreadyExists {
                kind: KIND_CONFIG_MAP,
                name,
            });
        }
        let mut stored = config_map.clone();
        stored.metadata.namespace = Some(self.namespace.clone());
        stored.metadata.resource_version = Some(state.bump());
        state.calls.push(format!("create ConfigMap/{name}"));
        state.config_maps.insert(name, stored.clone());
        Ok(stored)
    }

    async fn get_config_map(&self, name: &str) -> GatewayResult<Option<ConfigMap>> {
        let mut state = self.state();
        state.take_failure(KIND_CONFIG_MAP, "get")?;
        Ok(state.config_maps.get(name).cloned())
    }

    async fn replace_config_map(&self, config_map: &ConfigMap) -> GatewayResult<ConfigMap> {
        let mut state = self.state();
        state.take_failure(KIND_CONFIG_MAP, "replace")?;
        let name = name_of(&config_map.metadata);
        let current = state
            .config_maps
            .get(&name)
            .ok_or_else(|| GatewayError::NotFound {
                kind: KIND_CONFIG_MAP,
                name: name.clone(),
            })?;
        if config_map.metadata.resource_version.is_some()
            && config_map.metadata.resource_version != current.metadata.resource_version
        {
            return Err(GatewayError::StaleVersion {
                kind: KIND_CONFIG_MAP,
                name,
            });
        }
        let mut stored = config_map.clone();
        stored.metadata.resource_version = Some(state.bump());
        state.calls.push(format!("replace ConfigMap/{name}"));
        state.config_maps.insert(name, stored.clone());
        Ok(stored)
    }

    async fn list_config_maps(&self, selector: &str) -> GatewayResult<Vec<ConfigMap>> {
        let mut state = self.state();
        state.take_failure(KIND_CONFIG_MAP, "list")?;
        Ok(state
            .config_maps
            .values()
            .filter(|c| matches(selector, c.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }

    async fn delete_config_map(&self, name: &str) -> GatewayResult<()> {
        let mut state = self.state();
        state.take_failure(KIND_CONFIG_MAP, "delete")?;
        if state.config_maps.remove(name).is_none() {
            return Err(GatewayError::NotFound {
                kind: KIND_CONFIG_MAP,
                name: name.to_string(),
            });
        }
        state.calls.push(format!("delete ConfigMap/{name}"));
        Ok(())
    }

    async fn create_pod(&self, pod: &Pod) -> GatewayResult<Pod> {
        let mut state = self.state();
        state.take_failure(KIND_POD, "create")?;
        let name = name_of(&pod.metadata);
        if state.pods.contains_key(&name) {
            return Err(GatewayError::AlreadyExists {
                kind: KIND_POD,
                name,
            });
        }

        let mut stored = pod.clone();
        let cleanup_path = stored
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(CLEANUP_PATH_ANNOTATION))
            .cloned();
        // Cleanup pods run to completion instantly
        let phase = if let Some(path) = cleanup_path {
            let prefix = format!("{}/", path.trim_end_matches('/'));
            state
                .storage
                .retain(|p| p != &path && !p.starts_with(&prefix));
            "Succeeded"
        } else {
            "Running"
        };
        stored.status = Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        });
        stored.metadata.resource_version = Some(state.bump());
        state.calls.push(format!("create Pod/{name}"));
        state.pods.insert(name, stored.clone());
        Ok(stored)
    }

    async fn get_pod(&self, name: &str) -> GatewayResult<Option<Pod>> {
        let mut state = self.state();
        state.take_failure(KIND_POD, "get")?;
        Ok(state.pods.get(name).cloned())
    }

    async fn list_pods(&self, selector: &str) -> GatewayResult<Vec<Pod>> {
        let mut state = self.state();
        state.take_failure(KIND_POD, "list")?;
        Ok(state
            .pods
            .values()
            .filter(|p| matches(selector, p.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }

    async fn delete_pod(&self, name: &str) -> GatewayResult<()> {
        let mut state = self.state();
        state.take_failure(KIND_POD, "delete")?;
        let Some(pod) = state.pods.remove(name) else {
            return Err(GatewayError::NotFound {
                kind: KIND_POD,
                name: name.to_string(),
            });
        };
        state.calls.push(format!("delete Pod/{name}"));
        // The Deployment controller replaces pods it still wants
        let owner = pod
            .metadata
            .owner_references
            .as_ref()
            .and_then(|refs| refs.iter().find(|r| r.kind == KIND_DEPLOYMENT))
            .map(|r| r.name.clone());
        if let Some(owner) = owner {
            state.reconcile_pods(&owner);
        }
        Ok(())
    }
}
