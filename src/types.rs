// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Data model shared by the lifecycle manager, the classifier, and the HTTP API.
//!
//! The cluster is the only source of truth: a [`DiscoveredServer`] is rebuilt from
//! live Deployments and Services on every scan and never persisted elsewhere.

use crate::protocol::Protocol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Observed lifecycle state of a server.
///
/// `Creating -> Running <-> Stopped`, with `Restarting` as a transient sub-state of
/// `Running`. `Deleting` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerStatus {
    Creating,
    Running,
    Stopped,
    Restarting,
    Deleting,
}

impl ServerStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ServerStatus::Creating => "Creating",
            ServerStatus::Running => "Running",
            ServerStatus::Stopped => "Stopped",
            ServerStatus::Restarting => "Restarting",
            ServerStatus::Deleting => "Deleting",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live protocol server as observed from the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredServer {
    /// Logical (user-chosen) name, unique within protocol
    pub name: String,
    pub protocol: Protocol,
    /// Name of the Deployment backing this server
    pub resource_name: String,
    pub service_name: Option<String>,
    /// Cluster-internal DNS name of the Service
    pub dns_name: Option<String>,
    /// Service port of the primary protocol port
    pub port: Option<i32>,
    /// Externally reachable NodePort of the primary protocol port
    pub node_port: Option<i32>,
    pub cluster_ip: Option<String>,
    /// True only when `managed_by` is the control API
    pub is_dynamic: bool,
    pub managed_by: String,
    pub status: ServerStatus,
    pub replicas: i32,
    pub ready_replicas: i32,
    /// Isolated subpath on the shared NAS volume (SMB/NFS only)
    pub storage_subpath: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Configuration needed to recreate the server, credentials included.
    /// Only ever serialized through an export.
    #[serde(skip)]
    pub config: Option<ServerCreationRequest>,
}

impl DiscoveredServer {
    /// `dns:port` endpoint, when the server is exposed
    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        match (&self.dns_name, self.port) {
            (Some(dns), Some(port)) => Some(format!("{dns}:{port}")),
            _ => None,
        }
    }
}

/// Directory preset for NAS servers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryPreset {
    #[default]
    Input,
    Output,
    Backup,
    Custom,
}

impl DirectoryPreset {
    /// Directory name for the fixed presets; `None` for `Custom`
    #[must_use]
    pub fn directory(self) -> Option<&'static str> {
        match self {
            DirectoryPreset::Input => Some("input"),
            DirectoryPreset::Output => Some("output"),
            DirectoryPreset::Backup => Some("backup"),
            DirectoryPreset::Custom => None,
        }
    }
}

/// User/API input for a new server.
///
/// Fields that do not apply to the target protocol are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCreationRequest {
    /// Logical name; generated when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Explicit NodePort; the cluster assigns one when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// FTP/SFTP user id.
    ///
    /// Only SFTP applies it to the container. FTP keeps it in the stored
    /// request for export, but vsftpd maps every login to its own account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,
    /// FTP/SFTP group id, applied like [`Self::uid`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<i64>,
    /// NAS directory preset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<DirectoryPreset>,
    /// NAS directory when `directory` is `custom`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_directory: Option<String>,
    /// NFS export options / SMB share options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_options: Option<String>,
}

/// Lifecycle action on a dynamic server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Start,
    Stop,
    Restart,
}

impl LifecycleAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Restart => "restart",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleAction {
    type Err = crate::errors::ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(LifecycleAction::Start),
            "stop" => Ok(LifecycleAction::Stop),
            "restart" => Ok(LifecycleAction::Restart),
            other => Err(crate::errors::ServerError::validation(format!(
                "unknown lifecycle action '{other}' (expected start, stop or restart)"
            ))),
        }
    }
}

/// One server inside a configuration export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedServer {
    pub protocol: Protocol,
    /// Ownership in the source environment; informational on import
    #[serde(default)]
    pub is_dynamic: bool,
    #[serde(default)]
    pub managed_by: String,
    #[serde(flatten)]
    pub request: ServerCreationRequest,
}

/// Portable snapshot of every discovered server.
///
/// Contains credentials in clear text. Treat the file as trusted material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfigurationExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub namespace: String,
    #[serde(default)]
    pub release_name: String,
    pub servers: Vec<ExportedServer>,
}

/// Per-item decision when an imported server collides with an existing one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    #[default]
    Skip,
    Replace,
    Rename,
}

/// Body of `POST /configuration/import`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub configuration: ServerConfigurationExport,
    /// Resolution per imported server name
    #[serde(default)]
    pub resolutions: BTreeMap<String, ConflictResolution>,
    /// Resolution for items without an explicit entry
    #[serde(default)]
    pub default_resolution: ConflictResolution,
}

/// A failed import item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFailure {
    pub name: String,
    pub protocol: Protocol,
    /// Machine-readable reason (e.g. `ProtectionError`)
    pub reason: String,
    pub error: String,
}

/// Outcome of an import, one entry per item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    /// Final names of every server created, including replacements and renames
    pub created: Vec<String>,
    /// Names whose existing server was deleted and recreated
    pub replaced: Vec<String>,
    /// Original name -> new name for renamed items
    pub renamed: BTreeMap<String, String>,
    pub skipped: Vec<String>,
    pub failed: Vec<ImportFailure>,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;
