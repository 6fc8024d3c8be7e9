// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Identity and port allocation.
//!
//! Derives canonical resource names from logical names and checks explicit
//! NodePorts for syntax and range. Nothing here talks to the cluster: name and
//! port collisions are detected by the create call itself.

use crate::constants::{
    GENERATED_NAME_SUFFIX_LEN, IMPORT_RENAME_SUFFIX, MAX_LOGICAL_NAME_LEN, MAX_RESOURCE_NAME_LEN,
    NODE_PORT_MAX, NODE_PORT_MIN,
};
use crate::errors::{ServerError, ServerResult};
use crate::protocol::Protocol;
use crate::types::ServerCreationRequest;
use rand::Rng;

const NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Names and port resolved for a server about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    /// User-facing name, unique per protocol
    pub logical_name: String,
    /// Name shared by the Deployment, Service and ConfigMap
    pub resource_name: String,
    /// Explicit NodePort, `None` to let the cluster assign one
    pub node_port: Option<i32>,
}

/// Validate a logical server name.
///
/// Lowercase alphanumerics and `-`, starting with a letter and ending with an
/// alphanumeric.
///
/// # Errors
///
/// Returns [`ServerError::Validation`] describing the first rule broken.
pub fn validate_logical_name(name: &str) -> ServerResult<()> {
    if name.is_empty() {
        return Err(ServerError::validation("server name must not be empty"));
    }
    if name.len() > MAX_LOGICAL_NAME_LEN {
        return Err(ServerError::validation(format!(
            "server name '{name}' is longer than {MAX_LOGICAL_NAME_LEN} characters"
        )));
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(ServerError::validation(format!(
            "server name '{name}' must start with a lowercase letter"
        )));
    }
    if name.ends_with('-') {
        return Err(ServerError::validation(format!(
            "server name '{name}' must not end with '-'"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(ServerError::validation(format!(
            "server name '{name}' contains invalid character '{bad}'"
        )));
    }
    Ok(())
}

/// Canonical resource name: `{release}-{protocol}-{logical}`
#[must_use]
pub fn resource_name(release_name: &str, protocol: Protocol, logical_name: &str) -> String {
    format!("{release_name}-{protocol}-{logical_name}")
}

/// Random logical name of the form `{protocol}-{suffix}`
#[must_use]
pub fn generate_name(protocol: Protocol) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..GENERATED_NAME_SUFFIX_LEN)
        .map(|_| char::from(NAME_ALPHABET[rng.random_range(0..NAME_ALPHABET.len())]))
        .collect();
    format!("{protocol}-{suffix}")
}

/// Check an explicit NodePort against the allocatable range
///
/// # Errors
///
/// Returns [`ServerError::Validation`] if the port is outside 30000-32767.
pub fn validate_node_port(node_port: Option<i32>) -> ServerResult<Option<i32>> {
    match node_port {
        Some(port) if !(NODE_PORT_MIN..=NODE_PORT_MAX).contains(&port) => {
            Err(ServerError::validation(format!(
                "nodePort {port} is outside the allowed range {NODE_PORT_MIN}-{NODE_PORT_MAX}"
            )))
        }
        other => Ok(other),
    }
}

/// Resolve names and port for a creation request.
///
/// # Errors
///
/// Returns [`ServerError::Validation`] for a malformed name, an out-of-range
/// port, or a resource name that would exceed the Kubernetes limit.
pub fn allocate(
    release_name: &str,
    protocol: Protocol,
    request: &ServerCreationRequest,
) -> ServerResult<ServerIdentity> {
    let logical_name = match &request.name {
        Some(name) => {
            validate_logical_name(name)?;
            name.clone()
        }
        None => generate_name(protocol),
    };
    let node_port = validate_node_port(request.node_port)?;

    let resource_name = resource_name(release_name, protocol, &logical_name);
    if resource_name.len() > MAX_RESOURCE_NAME_LEN {
        return Err(ServerError::validation(format!(
            "resource name '{resource_name}' is longer than {MAX_RESOURCE_NAME_LEN} characters"
        )));
    }

    Ok(ServerIdentity {
        logical_name,
        resource_name,
        node_port,
    })
}

/// Rename candidate for an import collision.
///
/// `attempt` 1 gives `{name}-imported`, later attempts `{name}-imported-{attempt}`.
/// The base is shortened when needed so the result stays a valid logical name.
#[must_use]
pub fn rename_candidate(name: &str, attempt: u32) -> String {
    let suffix = if attempt <= 1 {
        format!("-{IMPORT_RENAME_SUFFIX}")
    } else {
        format!("-{IMPORT_RENAME_SUFFIX}-{attempt}")
    };
    let keep = MAX_LOGICAL_NAME_LEN.saturating_sub(suffix.len());
    let base: String = name.chars().take(keep).collect();
    format!("{}{suffix}", base.trim_end_matches('-'))
}

#[cfg(test)]
#[path = "naming_tests.rs"]
mod naming_tests;
