// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`ClusterGateway`] backed by a live Kubernetes API server.

use super::{
    ClusterGateway, Propagation, KIND_CONFIG_MAP, KIND_DEPLOYMENT, KIND_POD, KIND_SERVICE,
};
use crate::constants::{FIELD_MANAGER, KUBE_LIST_PAGE_SIZE};
use crate::errors::{classify_api_error, GatewayError, GatewayResult};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Gateway talking to the Kubernetes API through a `kube::Client`.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    namespace: String,
    timeout: Duration,
}

impl KubeGateway {
    /// Create a gateway bound to `namespace`, applying `timeout` to every call
    #[must_use]
    pub fn new(client: Client, namespace: &str, timeout: Duration) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            timeout,
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Run one API call under the gateway timeout and classify its failure
    async fn call<T, F>(
        &self,
        kind: &'static str,
        name: &str,
        operation: &'static str,
        fut: F,
    ) -> GatewayResult<T>
    where
        F: Future<Output = Result<T, kube::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(map_kube_error(kind, name, operation, err)),
            Err(_) => Err(GatewayError::Timeout {
                kind,
                name: name.to_string(),
                operation,
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// List all objects matching `selector`, one page at a time.
    ///
    /// Each page gets its own timeout budget.
    async fn list_paginated<K>(
        &self,
        api: &Api<K>,
        kind: &'static str,
        selector: &str,
    ) -> GatewayResult<Vec<K>>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync,
    {
        let mut list_params = ListParams::default().labels(selector);
        list_params.limit = Some(KUBE_LIST_PAGE_SIZE);

        let mut all_items = Vec::new();
        let mut page_count = 0;

        loop {
            page_count += 1;
            let result = self
                .call(kind, selector, "list", api.list(&list_params))
                .await?;

            let item_count = result.items.len();
            all_items.extend(result.items);

            debug!(
                kind = %kind,
                page = page_count,
                items_in_page = item_count,
                total_items = all_items.len(),
                "Fetched page from Kubernetes API"
            );

            match result.metadata.continue_ {
                Some(token) if !token.is_empty() => list_params.continue_token = Some(token),
                _ => break,
            }
        }

        Ok(all_items)
    }

    async fn delete_with<K>(
        &self,
        kind: &'static str,
        name: &str,
        params: &DeleteParams,
    ) -> GatewayResult<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug
            + Send
            + Sync,
    {
        let api: Api<K> = self.api();
        self.call(kind, name, "delete", api.delete(name, params))
            .await
            .map(|_| ())
    }
}

/// Convert a kube client error into a [`GatewayError`]
fn map_kube_error(
    kind: &'static str,
    name: &str,
    operation: &'static str,
    err: kube::Error,
) -> GatewayError {
    match err {
        kube::Error::Api(api_err) => classify_api_error(
            kind,
            name,
            operation,
            api_err.code,
            &api_err.reason,
            &api_err.message,
        ),
        other => GatewayError::Unavailable {
            kind,
            name: name.to_string(),
            operation,
            message: other.to_string(),
        },
    }
}

fn field_manager_params() -> PatchParams {
    let mut params = PatchParams::default();
    params.field_manager = Some(FIELD_MANAGER.to_string());
    params
}

fn object_name<K: Resource>(object: &K) -> &str {
    object.meta().name.as_deref().unwrap_or_default()
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn create_deployment(&self, deployment: &Deployment) -> GatewayResult<Deployment> {
        let api: Api<Deployment> = self.api();
        self.call(
            KIND_DEPLOYMENT,
            object_name(deployment),
            "create",
            api.create(&PostParams::default(), deployment),
        )
        .await
    }

    async fn get_deployment(&self, name: &str) -> GatewayResult<Option<Deployment>> {
        let api: Api<Deployment> = self.api();
        self.call(KIND_DEPLOYMENT, name, "get", api.get_opt(name))
            .await
    }

    async fn list_deployments(&self, selector: &str) -> GatewayResult<Vec<Deployment>> {
        let api: Api<Deployment> = self.api();
        self.list_paginated(&api, KIND_DEPLOYMENT, selector).await
    }

    async fn scale_deployment(&self, name: &str, replicas: i32) -> GatewayResult<()> {
        let api: Api<Deployment> = self.api();
        let patch = json!({ "spec": { "replicas": replicas } });
        self.call(
            KIND_DEPLOYMENT,
            name,
            "scale",
            api.patch_scale(name, &field_manager_params(), &Patch::Merge(&patch)),
        )
        .await
        .map(|_| ())
    }

    async fn annotate_deployment(
        &self,
        name: &str,
        annotations: BTreeMap<String, String>,
    ) -> GatewayResult<()> {
        let api: Api<Deployment> = self.api();
        let patch = json!({ "metadata": { "annotations": annotations } });
        self.call(
            KIND_DEPLOYMENT,
            name,
            "annotate",
            api.patch(name, &field_manager_params(), &Patch::Merge(&patch)),
        )
        .await
        .map(|_| ())
    }

    async fn delete_deployment(&self, name: &str, propagation: Propagation) -> GatewayResult<()> {
        let params = match propagation {
            Propagation::Foreground => DeleteParams::foreground(),
            Propagation::Background => DeleteParams::background(),
        };
        self.delete_with::<Deployment>(KIND_DEPLOYMENT, name, &params)
            .await
    }

    async fn create_service(&self, service: &Service) -> GatewayResult<Service> {
        let api: Api<Service> = self.api();
        self.call(
            KIND_SERVICE,
            object_name(service),
            "create",
            api.create(&PostParams::default(), service),
        )
        .await
    }

    async fn list_services(&self, selector: &str) -> GatewayResult<Vec<Service>> {
        let api: Api<Service> = self.api();
        self.list_paginated(&api, KIND_SERVICE, selector).await
    }

    async fn delete_service(&self, name: &str) -> GatewayResult<()> {
        self.delete_with::<Service>(KIND_SERVICE, name, &DeleteParams::default())
            .await
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> GatewayResult<ConfigMap> {
        let api: Api<ConfigMap> = self.api();
        self.call(
            KIND_CONFIG_MAP,
            object_name(config_map),
            "create",
            api.create(&PostParams::default(), config_map),
        )
        .await
    }

    async fn get_config_map(&self, name: &str) -> GatewayResult<Option<ConfigMap>> {
        let api: Api<ConfigMap> = self.api();
        self.call(KIND_CONFIG_MAP, name, "get", api.get_opt(name))
            .await
    }

    async fn replace_config_map(&self, config_map: &ConfigMap) -> GatewayResult<ConfigMap> {
        let api: Api<ConfigMap> = self.api();
        let name = object_name(config_map);
        self.call(
            KIND_CONFIG_MAP,
            name,
            "replace",
            api.replace(name, &PostParams::default(), config_map),
        )
        .await
    }

    async fn list_config_maps(&self, selector: &str) -> GatewayResult<Vec<ConfigMap>> {
        let api: Api<ConfigMap> = self.api();
        self.list_paginated(&api, KIND_CONFIG_MAP, selector).await
    }

    async fn delete_config_map(&self, name: &str) -> GatewayResult<()> {
        self.delete_with::<ConfigMap>(KIND_CONFIG_MAP, name, &DeleteParams::default())
            .await
    }

    async fn create_pod(&self, pod: &Pod) -> GatewayResult<Pod> {
        let api: Api<Pod> = self.api();
        self.call(
            KIND_POD,
            object_name(pod),
            "create",
            api.create(&PostParams::default(), pod),
        )
        .await
    }

    async fn get_pod(&self, name: &str) -> GatewayResult<Option<Pod>> {
        let api: Api<Pod> = self.api();
        self.call(KIND_POD, name, "get", api.get_opt(name)).await
    }

    async fn list_pods(&self, selector: &str) -> GatewayResult<Vec<Pod>> {
        let api: Api<Pod> = self.api();
        self.list_paginated(&api, KIND_POD, selector).await
    }

    async fn delete_pod(&self, name: &str) -> GatewayResult<()> {
        self.delete_with::<Pod>(KIND_POD, name, &DeleteParams::default())
            .await
    }
}
