// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Protocol blueprints and Kubernetes resource builders
//!
//! One static [`Blueprint`] per protocol describes the container image, ports,
//! credential encoding and storage shape. The `build_*` functions turn a
//! blueprint plus a creation request into the `Deployment`, `Service`,
//! `ConfigMap` and cleanup `Pod` a server is made of. All builders are pure.

use crate::config::Settings;
use crate::constants::{
    CLEANUP_IMAGE, CLEANUP_MOUNT_PATH, CLEANUP_POD_SUFFIX, CONFIG_MAP_SUFFIX,
    DEFAULT_NFS_EXPORT_OPTIONS, FTP_IMAGE, FTP_PORT, HTTP_IMAGE, HTTP_PORT, NAS_CONFIG_MOUNT_PATH,
    NFS_IMAGE, NFS_PORT, S3_API_PORT, S3_CONSOLE_PORT, S3_IMAGE, S3_MIN_PASSWORD_LEN, SFTP_IMAGE,
    SFTP_PORT, SMB_IMAGE, SMB_PORT, VOLUME_NAS_CONFIG, VOLUME_NAS_DATA,
};
use crate::errors::{ServerError, ServerResult};
use crate::labels::{
    CLEANUP_PATH_ANNOTATION, COMPONENT_PROTOCOL_SERVER, COMPONENT_STORAGE_CLEANUP, K8S_COMPONENT,
    K8S_INSTANCE, K8S_MANAGED_BY, K8S_NAME, K8S_PART_OF, MANAGED_BY_CONTROL_API,
    PART_OF_TRANSFERSIM, PROTOCOL_LABEL, SERVER_CONFIG_ANNOTATION, SERVER_NAME_LABEL,
    STORAGE_SUBPATH_ANNOTATION,
};
use crate::naming::ServerIdentity;
use crate::protocol::Protocol;
use crate::types::{DirectoryPreset, ServerCreationRequest};
use k8s_openapi::api::{
    apps::v1::{Deployment, DeploymentSpec},
    core::v1::{
        ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar,
        PersistentVolumeClaimVolumeSource, Pod, PodSpec, PodTemplateSpec, Probe, SecurityContext,
        Service, ServicePort, ServiceSpec, TCPSocketAction, Volume, VolumeMount,
    },
};
use k8s_openapi::apimachinery::pkg::{
    apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference},
    util::intstr::IntOrString,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

const CONTAINER_NAME_SERVER: &str = "server";
const CONTAINER_NAME_CLEANUP: &str = "cleanup";
const SMB_SHARE_PATH: &str = "/share";
const NFS_SHARE_PATH: &str = "/nfsshare";
const SMB_CONF_FILENAME: &str = "smb.conf";
const NFS_EXPORTS_FILENAME: &str = "exports";
const DEFAULT_SFTP_UID: i64 = 1001;
const DEFAULT_SFTP_GID: i64 = 100;
const SFTP_UPLOAD_DIR: &str = "upload";

const READINESS_INITIAL_DELAY_SECS: i32 = 2;
const READINESS_PERIOD_SECS: i32 = 5;

/// Whether a protocol needs credentials in its creation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialRequirement {
    Required,
    Optional,
    None,
}

/// How credentials are carried in the container environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialEncoding {
    /// No credentials
    None,
    /// One variable for the user, one for the password
    Pair {
        user_var: &'static str,
        password_var: &'static str,
    },
    /// `user{sep}password[{sep}uid{sep}gid...]` in a single variable
    Joined {
        var: &'static str,
        separator: char,
    },
}

/// A named listening port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlueprintPort {
    pub name: &'static str,
    pub port: u16,
}

/// Static per-protocol workload template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blueprint {
    pub protocol: Protocol,
    pub image: &'static str,
    /// First port is the primary endpoint and receives the requested NodePort
    pub ports: &'static [BlueprintPort],
    pub credentials: CredentialRequirement,
    pub encoding: CredentialEncoding,
    pub privileged: bool,
    /// Where the NAS data volume is mounted; `None` for non-NAS protocols
    pub data_mount_path: Option<&'static str>,
}

static BLUEPRINTS: [Blueprint; 6] = [
    Blueprint {
        protocol: Protocol::Ftp,
        image: FTP_IMAGE,
        ports: &[BlueprintPort {
            name: "ftp",
            port: FTP_PORT,
        }],
        credentials: CredentialRequirement::Required,
        encoding: CredentialEncoding::Pair {
            user_var: "FTP_USER",
            password_var: "FTP_PASS",
        },
        privileged: false,
        data_mount_path: None,
    },
    Blueprint {
        protocol: Protocol::Sftp,
        image: SFTP_IMAGE,
        ports: &[BlueprintPort {
            name: "sftp",
            port: SFTP_PORT,
        }],
        credentials: CredentialRequirement::Required,
        encoding: CredentialEncoding::Joined {
            var: "SFTP_USERS",
            separator: ':',
        },
        privileged: false,
        data_mount_path: None,
    },
    Blueprint {
        protocol: Protocol::S3,
        image: S3_IMAGE,
        ports: &[
            BlueprintPort {
                name: "s3",
                port: S3_API_PORT,
            },
            BlueprintPort {
                name: "console",
                port: S3_CONSOLE_PORT,
            },
        ],
        credentials: CredentialRequirement::Required,
        encoding: CredentialEncoding::Pair {
            user_var: "MINIO_ROOT_USER",
            password_var: "MINIO_ROOT_PASSWORD",
        },
        privileged: false,
        data_mount_path: None,
    },
    Blueprint {
        protocol: Protocol::Http,
        image: HTTP_IMAGE,
        ports: &[BlueprintPort {
            name: "http",
            port: HTTP_PORT,
        }],
        credentials: CredentialRequirement::Required,
        encoding: CredentialEncoding::Pair {
            user_var: "USERNAME",
            password_var: "PASSWORD",
        },
        privileged: false,
        data_mount_path: None,
    },
    Blueprint {
        protocol: Protocol::Smb,
        image: SMB_IMAGE,
        ports: &[BlueprintPort {
            name: "smb",
            port: SMB_PORT,
        }],
        credentials: CredentialRequirement::Optional,
        encoding: CredentialEncoding::Joined {
            var: "USER",
            separator: ';',
        },
        privileged: false,
        data_mount_path: Some(SMB_SHARE_PATH),
    },
    Blueprint {
        protocol: Protocol::Nfs,
        image: NFS_IMAGE,
        ports: &[BlueprintPort {
            name: "nfs",
            port: NFS_PORT,
        }],
        credentials: CredentialRequirement::None,
        encoding: CredentialEncoding::None,
        privileged: true,
        data_mount_path: Some(NFS_SHARE_PATH),
    },
];

/// Blueprint for a protocol
#[must_use]
pub fn blueprint(protocol: Protocol) -> &'static Blueprint {
    // BLUEPRINTS is ordered like Protocol::ALL
    &BLUEPRINTS[protocol as usize]
}

/// Entry of the protocol catalogue served at `GET /protocols`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintInfo {
    pub protocol: Protocol,
    pub image: &'static str,
    pub ports: Vec<BlueprintPort>,
    pub nas: bool,
    pub credentials: CredentialRequirement,
}

/// Catalogue of every protocol blueprint
#[must_use]
pub fn catalogue() -> Vec<BlueprintInfo> {
    BLUEPRINTS
        .iter()
        .map(|bp| BlueprintInfo {
            protocol: bp.protocol,
            image: bp.image,
            ports: bp.ports.to_vec(),
            nas: bp.protocol.is_nas(),
            credentials: bp.credentials,
        })
        .collect()
}

/// Reference from every created object to the running control-plane pod.
///
/// Deleting that pod garbage-collects everything carrying the binding. The
/// Service and ConfigMap get the same binding as the Deployment because they
/// do not cascade from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipBinding {
    pub pod_name: String,
    pub pod_uid: String,
}

impl OwnershipBinding {
    #[must_use]
    pub fn new(pod_name: &str, pod_uid: &str) -> Self {
        Self {
            pod_name: pod_name.to_string(),
            pod_uid: pod_uid.to_string(),
        }
    }

    /// Single owner reference pointing at the control-plane pod
    #[must_use]
    pub fn owner_references(&self) -> Vec<OwnerReference> {
        vec![OwnerReference {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            name: self.pod_name.clone(),
            uid: self.pod_uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]
    }
}

/// Everything needed to materialize one dynamic server
#[derive(Debug, Clone)]
pub struct ServerPlan<'a> {
    pub settings: &'a Settings,
    pub protocol: Protocol,
    pub identity: &'a ServerIdentity,
    pub request: &'a ServerCreationRequest,
    pub binding: &'a OwnershipBinding,
}

impl ServerPlan<'_> {
    fn blueprint(&self) -> &'static Blueprint {
        blueprint(self.protocol)
    }

    /// `{resource}/{directory}` on the shared NAS volume, for NAS protocols
    #[must_use]
    pub fn storage_subpath(&self) -> Option<String> {
        if !self.protocol.is_nas() {
            return None;
        }
        Some(format!(
            "{}/{}",
            self.identity.resource_name,
            nas_directory(self.request)
        ))
    }

    /// Name of the NAS configuration ConfigMap
    #[must_use]
    pub fn config_map_name(&self) -> String {
        format!("{}-{CONFIG_MAP_SUFFIX}", self.identity.resource_name)
    }

    /// Creation request as stored on the Deployment, with resolved name
    #[must_use]
    pub fn stored_request(&self) -> ServerCreationRequest {
        let mut stored = self.request.clone();
        stored.name = Some(self.identity.logical_name.clone());
        stored
    }
}

fn nas_directory(request: &ServerCreationRequest) -> String {
    let preset = request.directory.unwrap_or_default();
    match preset.directory() {
        Some(dir) => dir.to_string(),
        None => request
            .custom_directory
            .as_deref()
            .unwrap_or_default()
            .trim_matches('/')
            .to_string(),
    }
}

/// Check protocol-specific request fields before any cluster call
///
/// # Errors
///
/// Returns [`ServerError::Validation`] for missing or malformed credentials,
/// negative uid/gid, or an unsafe custom directory.
pub fn validate_request(protocol: Protocol, request: &ServerCreationRequest) -> ServerResult<()> {
    let bp = blueprint(protocol);

    let username = request.username.as_deref().filter(|u| !u.is_empty());
    let password = request.password.as_deref().filter(|p| !p.is_empty());
    match bp.credentials {
        CredentialRequirement::Required if username.is_none() || password.is_none() => {
            return Err(ServerError::validation(format!(
                "{protocol} servers require a username and password"
            )));
        }
        CredentialRequirement::Optional if username.is_some() != password.is_some() => {
            return Err(ServerError::validation(format!(
                "{protocol} credentials need both a username and a password"
            )));
        }
        _ => {}
    }

    if let CredentialEncoding::Joined { separator, .. } = bp.encoding {
        for value in [username, password].into_iter().flatten() {
            if value.contains(separator) {
                return Err(ServerError::validation(format!(
                    "{protocol} credentials must not contain '{separator}'"
                )));
            }
        }
    }

    if protocol == Protocol::S3 && password.is_some_and(|p| p.len() < S3_MIN_PASSWORD_LEN) {
        return Err(ServerError::validation(format!(
            "s3 password must be at least {S3_MIN_PASSWORD_LEN} characters"
        )));
    }

    for (field, value) in [("uid", request.uid), ("gid", request.gid)] {
        if value.is_some_and(|v| v < 0) {
            return Err(ServerError::validation(format!(
                "{field} must not be negative"
            )));
        }
    }

    if protocol.is_nas() && request.directory == Some(DirectoryPreset::Custom) {
        validate_custom_directory(request.custom_directory.as_deref())?;
    }
    Ok(())
}

fn validate_custom_directory(dir: Option<&str>) -> ServerResult<()> {
    let Some(dir) = dir.filter(|d| !d.trim_matches('/').is_empty()) else {
        return Err(ServerError::validation(
            "customDirectory is required when directory is 'custom'",
        ));
    };
    if dir.starts_with('/') {
        return Err(ServerError::validation(format!(
            "customDirectory '{dir}' must be relative"
        )));
    }
    let valid = dir.split('/').filter(|s| !s.is_empty()).all(|segment| {
        segment != "."
            && segment != ".."
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    });
    if valid {
        Ok(())
    } else {
        Err(ServerError::validation(format!(
            "customDirectory '{dir}' contains invalid path segments"
        )))
    }
}

/// Labels shared by every object of a dynamic server
#[must_use]
pub fn build_labels(plan: &ServerPlan<'_>) -> BTreeMap<String, String> {
    let mut labels = selector_labels(plan.protocol, &plan.identity.resource_name);
    labels.insert(K8S_NAME.into(), format!("{PART_OF_TRANSFERSIM}-{}", plan.protocol));
    labels.insert(K8S_COMPONENT.into(), COMPONENT_PROTOCOL_SERVER.into());
    labels.insert(K8S_PART_OF.into(), PART_OF_TRANSFERSIM.into());
    labels.insert(K8S_MANAGED_BY.into(), MANAGED_BY_CONTROL_API.into());
    labels.insert(
        SERVER_NAME_LABEL.into(),
        plan.identity.logical_name.clone(),
    );
    labels
}

/// Minimal immutable labels used as the Deployment and Service selector
fn selector_labels(protocol: Protocol, resource_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_INSTANCE.to_string(), resource_name.to_string()),
        (PROTOCOL_LABEL.to_string(), protocol.to_string()),
    ])
}

fn metadata(plan: &ServerPlan<'_>, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: Some(plan.settings.namespace.clone()),
        labels: Some(build_labels(plan)),
        owner_references: Some(plan.binding.owner_references()),
        ..Default::default()
    }
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Container environment for a request, using the blueprint's credential encoding
fn build_env(plan: &ServerPlan<'_>) -> Vec<EnvVar> {
    let request = plan.request;
    let username = request.username.clone().unwrap_or_default();
    let password = request.password.clone().unwrap_or_default();
    let mut vars = Vec::new();

    match plan.protocol {
        // vsftpd has no uid/gid variables; they only survive in the stored request
        Protocol::Ftp => {
            vars.push(env("FTP_USER", username));
            vars.push(env("FTP_PASS", password));
            vars.push(env("LOG_STDOUT", "YES"));
        }
        Protocol::Sftp => {
            let uid = request.uid.unwrap_or(DEFAULT_SFTP_UID);
            let gid = request.gid.unwrap_or(DEFAULT_SFTP_GID);
            vars.push(env(
                "SFTP_USERS",
                format!("{username}:{password}:{uid}:{gid}:{SFTP_UPLOAD_DIR}"),
            ));
        }
        Protocol::S3 => {
            vars.push(env("MINIO_ROOT_USER", username));
            vars.push(env("MINIO_ROOT_PASSWORD", password));
        }
        Protocol::Http => {
            vars.push(env("AUTH_TYPE", "Basic"));
            vars.push(env("USERNAME", username));
            vars.push(env("PASSWORD", password));
        }
        Protocol::Smb => {
            if request.username.is_some() {
                vars.push(env("USER", format!("{username};{password}")));
            }
        }
        Protocol::Nfs => {
            vars.push(env("SHARED_DIRECTORY", NFS_SHARE_PATH));
        }
    }
    vars
}

fn build_container(plan: &ServerPlan<'_>) -> Container {
    let bp = plan.blueprint();
    let primary_port = bp.ports.first().map_or(0, |p| i32::from(p.port));

    let args = match plan.protocol {
        Protocol::S3 => Some(vec![
            "server".into(),
            "/data".into(),
            "--console-address".into(),
            format!(":{S3_CONSOLE_PORT}"),
        ]),
        Protocol::Smb => Some(vec![
            "-s".into(),
            smb_share_definition(plan.request),
            "-p".into(),
        ]),
        _ => None,
    };

    let mut volume_mounts = Vec::new();
    if let (Some(mount_path), Some(sub_path)) = (bp.data_mount_path, plan.storage_subpath()) {
        volume_mounts.push(VolumeMount {
            name: VOLUME_NAS_DATA.into(),
            mount_path: mount_path.into(),
            sub_path: Some(sub_path),
            ..Default::default()
        });
        volume_mounts.push(VolumeMount {
            name: VOLUME_NAS_CONFIG.into(),
            mount_path: NAS_CONFIG_MOUNT_PATH.into(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    Container {
        name: CONTAINER_NAME_SERVER.into(),
        image: Some(bp.image.into()),
        image_pull_policy: Some("IfNotPresent".into()),
        args,
        ports: Some(
            bp.ports
                .iter()
                .map(|p| ContainerPort {
                    name: Some(p.name.into()),
                    container_port: i32::from(p.port),
                    protocol: Some("TCP".into()),
                    ..Default::default()
                })
                .collect(),
        ),
        env: Some(build_env(plan)),
        volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
        readiness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(primary_port),
                ..Default::default()
            }),
            initial_delay_seconds: Some(READINESS_INITIAL_DELAY_SECS),
            period_seconds: Some(READINESS_PERIOD_SECS),
            ..Default::default()
        }),
        security_context: bp.privileged.then(|| SecurityContext {
            privileged: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn smb_share_definition(request: &ServerCreationRequest) -> String {
    // name;path;browseable;readonly;guest;users
    match &request.username {
        Some(user) => format!("data;{SMB_SHARE_PATH};yes;no;no;{user}"),
        None => format!("data;{SMB_SHARE_PATH};yes;no;yes"),
    }
}

fn build_volumes(plan: &ServerPlan<'_>) -> Option<Vec<Volume>> {
    if !plan.protocol.is_nas() {
        return None;
    }
    Some(vec![
        Volume {
            name: VOLUME_NAS_DATA.into(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: plan.settings.nas_pvc_name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: VOLUME_NAS_CONFIG.into(),
            config_map: Some(ConfigMapVolumeSource {
                name: plan.config_map_name(),
                ..Default::default()
            }),
            ..Default::default()
        },
    ])
}

/// Builds the `Deployment` for a dynamic server.
///
/// The creation request is stored in the `transfersim.io/server-config`
/// annotation so exports can reproduce it.
#[must_use]
pub fn build_deployment(plan: &ServerPlan<'_>) -> Deployment {
    let name = &plan.identity.resource_name;
    debug!(
        name = %name,
        protocol = %plan.protocol,
        "Building Deployment for protocol server"
    );

    let labels = build_labels(plan);
    let mut annotations = BTreeMap::from([(
        SERVER_CONFIG_ANNOTATION.to_string(),
        serde_json::to_string(&plan.stored_request()).unwrap_or_default(),
    )]);
    if let Some(sub_path) = plan.storage_subpath() {
        annotations.insert(STORAGE_SUBPATH_ANNOTATION.to_string(), sub_path);
    }

    let mut meta = metadata(plan, name);
    meta.annotations = Some(annotations);

    Deployment {
        metadata: meta,
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels(plan.protocol, name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![build_container(plan)],
                    volumes: build_volumes(plan),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the NodePort `Service` exposing a dynamic server.
///
/// The requested NodePort goes on the primary port; every other port is left
/// for the cluster to assign.
#[must_use]
pub fn build_service(plan: &ServerPlan<'_>) -> Service {
    let name = &plan.identity.resource_name;
    let ports = plan
        .blueprint()
        .ports
        .iter()
        .enumerate()
        .map(|(idx, p)| ServicePort {
            name: Some(p.name.into()),
            port: i32::from(p.port),
            target_port: Some(IntOrString::Int(i32::from(p.port))),
            protocol: Some("TCP".into()),
            node_port: if idx == 0 { plan.identity.node_port } else { None },
            ..Default::default()
        })
        .collect();

    Service {
        metadata: metadata(plan, name),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(plan.protocol, name)),
            ports: Some(ports),
            type_: Some("NodePort".into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the share/export definition `ConfigMap` for NAS servers.
///
/// Returns `None` for non-NAS protocols.
#[must_use]
pub fn build_nas_config_map(plan: &ServerPlan<'_>) -> Option<ConfigMap> {
    let data = match plan.protocol {
        Protocol::Nfs => {
            let options = plan
                .request
                .export_options
                .as_deref()
                .unwrap_or(DEFAULT_NFS_EXPORT_OPTIONS);
            BTreeMap::from([(
                NFS_EXPORTS_FILENAME.to_string(),
                format!("{NFS_SHARE_PATH} *({options})\n"),
            )])
        }
        Protocol::Smb => {
            let guest = if plan.request.username.is_some() {
                "no"
            } else {
                "yes"
            };
            let mut conf = format!(
                "[data]\n   path = {SMB_SHARE_PATH}\n   browseable = yes\n   read only = no\n   guest ok = {guest}\n"
            );
            if let Some(user) = &plan.request.username {
                conf.push_str(&format!("   valid users = {user}\n"));
            }
            BTreeMap::from([(SMB_CONF_FILENAME.to_string(), conf)])
        }
        _ => return None,
    };

    Some(ConfigMap {
        metadata: metadata(plan, &plan.config_map_name()),
        data: Some(data),
        ..Default::default()
    })
}

/// Builds the one-shot `Pod` that removes a NAS server's storage directory.
///
/// The pod mounts the shared NAS claim and deletes `{resource}/`. It carries
/// the same ownership binding so an abandoned cleanup pod is collected too.
#[must_use]
pub fn build_cleanup_pod(
    settings: &Settings,
    resource_name: &str,
    binding: &OwnershipBinding,
) -> Pod {
    let labels = BTreeMap::from([
        (K8S_COMPONENT.to_string(), COMPONENT_STORAGE_CLEANUP.to_string()),
        (K8S_PART_OF.to_string(), PART_OF_TRANSFERSIM.to_string()),
        (K8S_MANAGED_BY.to_string(), MANAGED_BY_CONTROL_API.to_string()),
    ]);

    Pod {
        metadata: ObjectMeta {
            name: Some(cleanup_pod_name(resource_name)),
            namespace: Some(settings.namespace.clone()),
            labels: Some(labels),
            annotations: Some(BTreeMap::from([(
                CLEANUP_PATH_ANNOTATION.to_string(),
                resource_name.to_string(),
            )])),
            owner_references: Some(binding.owner_references()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".into()),
            containers: vec![Container {
                name: CONTAINER_NAME_CLEANUP.into(),
                image: Some(CLEANUP_IMAGE.into()),
                command: Some(vec![
                    "sh".into(),
                    "-c".into(),
                    format!("rm -rf {CLEANUP_MOUNT_PATH}/{resource_name}"),
                ]),
                volume_mounts: Some(vec![VolumeMount {
                    name: VOLUME_NAS_DATA.into(),
                    mount_path: CLEANUP_MOUNT_PATH.into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            volumes: Some(vec![Volume {
                name: VOLUME_NAS_DATA.into(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: settings.nas_pvc_name.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[must_use]
pub fn cleanup_pod_name(resource_name: &str) -> String {
    format!("{resource_name}-{CLEANUP_POD_SUFFIX}")
}

/// Recover a creation request from a container environment.
///
/// Used for statically provisioned servers, which carry no stored request.
/// The inverse of the blueprint's credential encoding.
#[must_use]
pub fn recover_request(
    protocol: Protocol,
    env: &[EnvVar],
    logical_name: &str,
    node_port: Option<i32>,
) -> ServerCreationRequest {
    let lookup = |var: &str| {
        env.iter()
            .find(|e| e.name == var)
            .and_then(|e| e.value.clone())
    };

    let mut request = ServerCreationRequest {
        name: Some(logical_name.to_string()),
        node_port,
        ..Default::default()
    };

    match blueprint(protocol).encoding {
        CredentialEncoding::None => {}
        CredentialEncoding::Pair {
            user_var,
            password_var,
        } => {
            request.username = lookup(user_var);
            request.password = lookup(password_var);
        }
        CredentialEncoding::Joined { var, separator } => {
            if let Some(joined) = lookup(var) {
                // atmoz/sftp accepts several space-separated users; the first wins
                let first = joined.split_whitespace().next().unwrap_or_default();
                let mut parts = first.split(separator);
                request.username = parts.next().map(str::to_string).filter(|s| !s.is_empty());
                request.password = parts.next().map(str::to_string).filter(|s| !s.is_empty());
                request.uid = parts.next().and_then(|v| v.parse().ok());
                request.gid = parts.next().and_then(|v| v.parse().ok());
            }
        }
    }
    if protocol.is_nas() {
        request.directory = Some(DirectoryPreset::default());
    }
    request
}

#[cfg(test)]
#[path = "blueprints_tests.rs"]
mod blueprints_tests;
