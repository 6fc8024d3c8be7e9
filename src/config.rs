// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line and environment configuration.
//!
//! Every flag has an environment variable fallback so the control plane can be
//! configured from a Helm-rendered pod spec (downward API for `POD_NAME`,
//! `POD_UID` and `POD_NAMESPACE`).

use crate::constants::{
    DEFAULT_BIND_ADDRESS, DEFAULT_CLUSTER_TIMEOUT_SECS, DEFAULT_DELETION_TIMEOUT_SECS,
    DEFAULT_IMPORT_ITEM_TIMEOUT_SECS, DEFAULT_RELEASE_NAME,
};
use crate::errors::{ServerError, ServerResult};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Longest release prefix that still leaves room for protocol and logical name
const MAX_RELEASE_NAME_LEN: usize = 16;

/// Control plane for simulated file-transfer protocol servers
#[derive(Debug, Clone, Parser)]
#[command(name = "transfersim", version, about)]
pub struct Cli {
    /// Namespace the servers live in (defaults to the client's namespace)
    #[arg(long, env = "POD_NAMESPACE")]
    pub namespace: Option<String>,

    /// Release prefix for every resource name
    #[arg(long, env = "RELEASE_NAME", default_value = DEFAULT_RELEASE_NAME)]
    pub release_name: String,

    /// Name of the pod running this control plane (ownership binding target)
    #[arg(long, env = "POD_NAME")]
    pub pod_name: String,

    /// UID of the pod running this control plane; looked up when absent
    #[arg(long, env = "POD_UID")]
    pub pod_uid: Option<String>,

    /// Address the HTTP API listens on
    #[arg(long, env = "BIND_ADDRESS", default_value = DEFAULT_BIND_ADDRESS)]
    pub bind_address: SocketAddr,

    /// Timeout of a single cluster API call
    #[arg(long, env = "CLUSTER_TIMEOUT_SECS", default_value_t = DEFAULT_CLUSTER_TIMEOUT_SECS)]
    pub cluster_timeout_secs: u64,

    /// Timeout budget of one import item
    #[arg(long, env = "IMPORT_ITEM_TIMEOUT_SECS", default_value_t = DEFAULT_IMPORT_ITEM_TIMEOUT_SECS)]
    pub import_item_timeout_secs: u64,

    /// Time to wait for foreground deletion and storage cleanup
    #[arg(long, env = "DELETION_TIMEOUT_SECS", default_value_t = DEFAULT_DELETION_TIMEOUT_SECS)]
    pub deletion_timeout_secs: u64,

    /// Shared PVC holding NAS data (defaults to `{release}-nas-data`)
    #[arg(long, env = "NAS_PVC_NAME")]
    pub nas_pvc_name: Option<String>,

    /// ConfigMap holding the service discovery document (defaults to `{release}-service-discovery`)
    #[arg(long, env = "DISCOVERY_CONFIG_MAP")]
    pub discovery_config_map: Option<String>,

    /// Cluster DNS domain used to build service DNS names
    #[arg(long, env = "CLUSTER_DOMAIN", default_value = "cluster.local")]
    pub cluster_domain: String,
}

/// Resolved, immutable settings shared by every component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub namespace: String,
    pub release_name: String,
    pub cluster_domain: String,
    pub nas_pvc_name: String,
    pub discovery_config_map: String,
    pub cluster_timeout: Duration,
    pub import_item_timeout: Duration,
    pub deletion_timeout: Duration,
}

impl Settings {
    /// Settings with every optional value at its default
    #[must_use]
    pub fn new(namespace: &str, release_name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            release_name: release_name.to_string(),
            cluster_domain: "cluster.local".to_string(),
            nas_pvc_name: format!("{release_name}-nas-data"),
            discovery_config_map: format!("{release_name}-service-discovery"),
            cluster_timeout: Duration::from_secs(DEFAULT_CLUSTER_TIMEOUT_SECS),
            import_item_timeout: Duration::from_secs(DEFAULT_IMPORT_ITEM_TIMEOUT_SECS),
            deletion_timeout: Duration::from_secs(DEFAULT_DELETION_TIMEOUT_SECS),
        }
    }

    /// Resolve settings from parsed flags.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the release name is not a valid name prefix
    /// or a timeout is zero.
    pub fn from_cli(cli: &Cli, default_namespace: &str) -> ServerResult<Self> {
        validate_release_name(&cli.release_name)?;
        for (flag, value) in [
            ("cluster-timeout-secs", cli.cluster_timeout_secs),
            ("import-item-timeout-secs", cli.import_item_timeout_secs),
            ("deletion-timeout-secs", cli.deletion_timeout_secs),
        ] {
            if value == 0 {
                return Err(ServerError::validation(format!(
                    "--{flag} must be greater than zero"
                )));
            }
        }

        let namespace = cli
            .namespace
            .clone()
            .unwrap_or_else(|| default_namespace.to_string());
        let mut settings = Self::new(&namespace, &cli.release_name);
        settings.cluster_domain.clone_from(&cli.cluster_domain);
        if let Some(pvc) = &cli.nas_pvc_name {
            settings.nas_pvc_name.clone_from(pvc);
        }
        if let Some(cm) = &cli.discovery_config_map {
            settings.discovery_config_map.clone_from(cm);
        }
        settings.cluster_timeout = Duration::from_secs(cli.cluster_timeout_secs);
        settings.import_item_timeout = Duration::from_secs(cli.import_item_timeout_secs);
        settings.deletion_timeout = Duration::from_secs(cli.deletion_timeout_secs);
        Ok(settings)
    }

    /// Cluster-internal DNS name of a Service in this namespace
    #[must_use]
    pub fn service_dns_name(&self, service_name: &str) -> String {
        format!(
            "{service_name}.{}.svc.{}",
            self.namespace, self.cluster_domain
        )
    }
}

/// Release names become the first segment of every Service name, so they must
/// start with a letter.
fn validate_release_name(name: &str) -> ServerResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_RELEASE_NAME_LEN
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ServerError::validation(format!(
            "release name '{name}' must be 1-{MAX_RELEASE_NAME_LEN} lowercase alphanumerics or '-', starting with a letter"
        )))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
