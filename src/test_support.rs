// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fixtures for unit tests

use crate::blueprints::OwnershipBinding;
use crate::config::Settings;
use crate::gateway::memory::MemoryGateway;
use crate::lifecycle::LifecycleManager;
use crate::labels::{
    K8S_INSTANCE, K8S_MANAGED_BY, MANAGED_BY_HELM, PROTOCOL_LABEL, SERVER_NAME_LABEL,
};
use crate::protocol::Protocol;
use crate::types::{DirectoryPreset, ServerCreationRequest};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const NAMESPACE: &str = "transfer";
pub const RELEASE: &str = "ts";

pub fn settings() -> Settings {
    let mut settings = Settings::new(NAMESPACE, RELEASE);
    settings.deletion_timeout = Duration::from_secs(2);
    settings.import_item_timeout = Duration::from_secs(5);
    settings
}

pub fn binding() -> OwnershipBinding {
    OwnershipBinding::new("control-0", "uid-control-0")
}

pub fn gateway() -> Arc<MemoryGateway> {
    Arc::new(MemoryGateway::new(NAMESPACE))
}

pub fn manager(gateway: &Arc<MemoryGateway>) -> LifecycleManager {
    LifecycleManager::new(gateway.clone(), Arc::new(settings()), binding())
}

pub fn ftp_request(name: &str, node_port: Option<i32>) -> ServerCreationRequest {
    ServerCreationRequest {
        name: Some(name.to_string()),
        node_port,
        username: Some("alice".to_string()),
        password: Some("secret123".to_string()),
        ..Default::default()
    }
}

pub fn nfs_request(name: &str) -> ServerCreationRequest {
    ServerCreationRequest {
        name: Some(name.to_string()),
        directory: Some(DirectoryPreset::Input),
        ..Default::default()
    }
}

/// Seed a Helm-managed FTP server named `name` with Deployment and Service `resource`
pub fn seed_static_ftp(gateway: &MemoryGateway, resource: &str, name: &str, node_port: i32) {
    seed_static_ftp_in(gateway, resource, resource, name, node_port);
}

/// Like [`seed_static_ftp`], with an explicit `app.kubernetes.io/instance` label
pub fn seed_static_ftp_in(
    gateway: &MemoryGateway,
    instance: &str,
    resource: &str,
    name: &str,
    node_port: i32,
) {
    let labels = BTreeMap::from([
        (K8S_INSTANCE.to_string(), instance.to_string()),
        (PROTOCOL_LABEL.to_string(), Protocol::Ftp.to_string()),
        (K8S_MANAGED_BY.to_string(), MANAGED_BY_HELM.to_string()),
        (SERVER_NAME_LABEL.to_string(), name.to_string()),
    ]);
    let env = vec![
        EnvVar {
            name: "FTP_USER".to_string(),
            value: Some("static-user".to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "FTP_PASS".to_string(),
            value: Some("static-pass".to_string()),
            ..Default::default()
        },
    ];

    gateway.insert_deployment(Deployment {
        metadata: ObjectMeta {
            name: Some(resource.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(labels.clone()),
            uid: Some(format!("uid-{resource}")),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "ftp".to_string(),
                        env: Some(env),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    });

    gateway.insert_service(Service {
        metadata: ObjectMeta {
            name: Some(resource.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels),
            type_: Some("NodePort".to_string()),
            cluster_ip: Some("10.96.100.1".to_string()),
            ports: Some(vec![ServicePort {
                name: Some("ftp".to_string()),
                port: 21,
                node_port: Some(node_port),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    });
}
