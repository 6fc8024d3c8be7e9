// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across the control plane.
//!
//! Static servers deployed by the Helm chart carry the same `transfersim.io/*`
//! labels as dynamic ones; only `app.kubernetes.io/managed-by` tells them apart.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/part-of`
pub const PART_OF_TRANSFERSIM: &str = "transfersim";

/// Component value for protocol servers
pub const COMPONENT_PROTOCOL_SERVER: &str = "protocol-server";

/// Component value for the storage cleanup pod
pub const COMPONENT_STORAGE_CLEANUP: &str = "storage-cleanup";

/// Component value for the service discovery document
pub const COMPONENT_SERVICE_DISCOVERY: &str = "service-discovery";

// ============================================================================
// Kubernetes Standard Label Values - Managed By
// ============================================================================

/// The dynamic-management authority. Only resources carrying this value are mutable.
pub const MANAGED_BY_CONTROL_API: &str = "control-api";

/// Value written by the Helm chart for statically provisioned servers
pub const MANAGED_BY_HELM: &str = "Helm";

/// Reported when a discovered resource carries no `managed-by` label at all
pub const MANAGED_BY_UNKNOWN: &str = "unknown";

// ============================================================================
// Transfersim-Specific Labels
// ============================================================================

/// Protocol of the server (`ftp`, `sftp`, `s3`, `http`, `smb`, `nfs`)
pub const PROTOCOL_LABEL: &str = "transfersim.io/protocol";

/// Logical (user-chosen) server name
pub const SERVER_NAME_LABEL: &str = "transfersim.io/server-name";

// ============================================================================
// Transfersim-Specific Annotations
// ============================================================================

/// JSON-encoded creation request, used to export dynamic servers
pub const SERVER_CONFIG_ANNOTATION: &str = "transfersim.io/server-config";

/// Storage subpath on the shared NAS volume owned by this server
pub const STORAGE_SUBPATH_ANNOTATION: &str = "transfersim.io/storage-subpath";

/// RFC 3339 timestamp of the last Restart action
pub const RESTARTED_AT_ANNOTATION: &str = "transfersim.io/restarted-at";

/// RFC 3339 timestamp of the last discovery document rebuild
pub const GENERATED_AT_ANNOTATION: &str = "transfersim.io/generated-at";

/// Storage directory removed by a cleanup pod
pub const CLEANUP_PATH_ANNOTATION: &str = "transfersim.io/cleanup-path";

// ============================================================================
// Selectors
// ============================================================================

/// Label selector matching every protocol server, static or dynamic
pub const PROTOCOL_SERVER_SELECTOR: &str = "transfersim.io/protocol";

/// Builds a selector matching objects that belong to one server instance
#[must_use]
pub fn instance_selector(resource_name: &str) -> String {
    format!("{K8S_INSTANCE}={resource_name}")
}
