// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for cluster calls and server lifecycle operations.
//!
//! Two layers:
//! - [`GatewayError`] - one failed Kubernetes API call, naming the object kind,
//!   object name and operation
//! - [`ServerError`] - the taxonomy surfaced to API callers (validation, conflict,
//!   protection, partial failure, transient cluster failure)
//!
//! None of these errors are retried inside the control plane. Retry policy belongs
//! to the caller.

use thiserror::Error;

/// Errors returned by the cluster object gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Create rejected because an object with the same name exists (HTTP 409 `AlreadyExists`)
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Object kind (e.g. `Deployment`)
        kind: &'static str,
        /// Object name
        name: String,
    },

    /// The object does not exist (HTTP 404)
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Object kind
        kind: &'static str,
        /// Object name
        name: String,
    },

    /// Update rejected because the supplied resource version is stale (HTTP 409 `Conflict`)
    #[error("{kind} '{name}' was modified concurrently (stale resource version)")]
    StaleVersion {
        /// Object kind
        kind: &'static str,
        /// Object name
        name: String,
    },

    /// Service create rejected because a requested NodePort is already allocated
    #[error("{kind} '{name}' requested a port that is already allocated: {message}")]
    PortAllocated {
        /// Object kind
        kind: &'static str,
        /// Object name
        name: String,
        /// API server message
        message: String,
    },

    /// Any other 4xx rejection from the API server
    #[error("{operation} {kind} '{name}' rejected by the API server (HTTP {code}): {message}")]
    Rejected {
        /// Object kind
        kind: &'static str,
        /// Object name
        name: String,
        /// Operation that failed (`create`, `delete`, ...)
        operation: &'static str,
        /// HTTP status code
        code: u16,
        /// API server message
        message: String,
    },

    /// The call exceeded its timeout budget
    #[error("{operation} {kind} '{name}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Object kind
        kind: &'static str,
        /// Object name
        name: String,
        /// Operation that timed out
        operation: &'static str,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Connectivity failure, throttling (429) or server-side error (5xx)
    #[error("cluster API unavailable during {operation} {kind} '{name}': {message}")]
    Unavailable {
        /// Object kind
        kind: &'static str,
        /// Object name
        name: String,
        /// Operation that failed
        operation: &'static str,
        /// Underlying error message
        message: String,
    },
}

impl GatewayError {
    /// Kind of the object the failed call targeted
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::AlreadyExists { kind, .. }
            | GatewayError::NotFound { kind, .. }
            | GatewayError::StaleVersion { kind, .. }
            | GatewayError::PortAllocated { kind, .. }
            | GatewayError::Rejected { kind, .. }
            | GatewayError::Timeout { kind, .. }
            | GatewayError::Unavailable { kind, .. } => kind,
        }
    }

    /// Name of the object the failed call targeted
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            GatewayError::AlreadyExists { name, .. }
            | GatewayError::NotFound { name, .. }
            | GatewayError::StaleVersion { name, .. }
            | GatewayError::PortAllocated { name, .. }
            | GatewayError::Rejected { name, .. }
            | GatewayError::Timeout { name, .. }
            | GatewayError::Unavailable { name, .. } => name,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }

    /// Whether repeating the whole operation may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. } | GatewayError::Unavailable { .. }
        )
    }
}

/// Classify an API server error response into a [`GatewayError`].
///
/// # HTTP Code Mapping
///
/// | HTTP Code | Reason | Result |
/// |-----------|--------|--------|
/// | 404 | any | `NotFound` |
/// | 409 | `AlreadyExists` | `AlreadyExists` |
/// | 409 | other | `StaleVersion` |
/// | 422 | message contains "already allocated" | `PortAllocated` |
/// | 429, 5xx | any | `Unavailable` |
/// | other 4xx | any | `Rejected` |
#[must_use]
pub fn classify_api_error(
    kind: &'static str,
    name: &str,
    operation: &'static str,
    code: u16,
    reason: &str,
    message: &str,
) -> GatewayError {
    let name = name.to_string();
    match code {
        404 => GatewayError::NotFound { kind, name },
        409 if reason == "AlreadyExists" => GatewayError::AlreadyExists { kind, name },
        409 => GatewayError::StaleVersion { kind, name },
        422 if message.contains("already allocated") => GatewayError::PortAllocated {
            kind,
            name,
            message: message.to_string(),
        },
        429 | 500..=599 => GatewayError::Unavailable {
            kind,
            name,
            operation,
            message: format!("HTTP {code}: {message}"),
        },
        _ => GatewayError::Rejected {
            kind,
            name,
            operation,
            code,
            message: message.to_string(),
        },
    }
}

/// Errors surfaced by server lifecycle, discovery and import/export operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Malformed request, rejected before any cluster call
    #[error("validation failed: {0}")]
    Validation(String),

    /// Name or port collision detected by the cluster at create time
    #[error("conflict on {kind} '{name}': {message}")]
    Conflict {
        /// Object kind that collided
        kind: String,
        /// Object name that collided
        name: String,
        /// API server message
        message: String,
    },

    /// Attempted mutation of a statically provisioned server
    #[error("server '{name}' is managed by '{managed_by}' and cannot be modified by the control API")]
    Protection {
        /// Server name
        name: String,
        /// Value of the server's `managed-by` label
        managed_by: String,
    },

    /// No server matches the requested name
    #[error("server '{0}' not found")]
    NotFound(String),

    /// Lifecycle action not allowed from the server's current state
    #[error("cannot {action} server '{name}' while it is {state}")]
    InvalidTransition {
        /// Server name
        name: String,
        /// Requested action
        action: String,
        /// Current state
        state: String,
    },

    /// A multi-object operation failed after some objects were already changed
    #[error(
        "partial failure during {operation} of server '{name}': completed [{}], failed at {failed_step}: {message}",
        completed.join(", ")
    )]
    PartialFailure {
        /// Server name
        name: String,
        /// Operation (`create`, `delete`)
        operation: String,
        /// Objects that were created or deleted successfully, as `Kind/name`
        completed: Vec<String>,
        /// Step that failed, as `Kind/name`
        failed_step: String,
        /// Underlying error message
        message: String,
    },

    /// Timeout or connectivity failure talking to the cluster. Safe to retry.
    #[error("transient cluster error: {0}")]
    TransientCluster(GatewayError),

    /// Any other cluster failure
    #[error("cluster error: {0}")]
    Cluster(GatewayError),
}

impl ServerError {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Wrap a failed step of a multi-object operation.
    ///
    /// When nothing was completed yet the gateway error is surfaced as-is, so a
    /// first-step conflict stays a plain [`ServerError::Conflict`].
    #[must_use]
    pub fn partial(
        name: &str,
        operation: &str,
        completed: &[String],
        failed_step: String,
        source: GatewayError,
    ) -> Self {
        if completed.is_empty() {
            return source.into();
        }
        Self::PartialFailure {
            name: name.to_string(),
            operation: operation.to_string(),
            completed: completed.to_vec(),
            failed_step,
            message: source.to_string(),
        }
    }

    /// Machine-readable reason, used in HTTP error bodies and metrics labels
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ServerError::Validation(_) => "ValidationError",
            ServerError::Conflict { .. } => "ConflictError",
            ServerError::Protection { .. } => "ProtectionError",
            ServerError::NotFound(_) => "NotFound",
            ServerError::InvalidTransition { .. } => "InvalidTransition",
            ServerError::PartialFailure { .. } => "PartialFailureError",
            ServerError::TransientCluster(_) => "TransientClusterError",
            ServerError::Cluster(_) => "ClusterError",
        }
    }
}

impl From<GatewayError> for ServerError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::AlreadyExists { kind, ref name } => ServerError::Conflict {
                kind: kind.to_string(),
                name: name.clone(),
                message: err.to_string(),
            },
            GatewayError::PortAllocated {
                kind,
                ref name,
                ref message,
            } => ServerError::Conflict {
                kind: kind.to_string(),
                name: name.clone(),
                message: message.clone(),
            },
            GatewayError::NotFound { name, .. } => ServerError::NotFound(name),
            GatewayError::Timeout { .. } | GatewayError::Unavailable { .. } => {
                ServerError::TransientCluster(err)
            }
            GatewayError::Rejected { code, .. } if code == 400 || code == 422 => {
                ServerError::Validation(err.to_string())
            }
            GatewayError::StaleVersion { .. } | GatewayError::Rejected { .. } => {
                ServerError::Cluster(err)
            }
        }
    }
}

/// Convenience alias for results of server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Convenience alias for results of gateway calls
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
