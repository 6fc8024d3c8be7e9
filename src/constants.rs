// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the transfersim control plane.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Naming Constants
// ============================================================================

/// Default release prefix used for every resource name
pub const DEFAULT_RELEASE_NAME: &str = "transfersim";

/// Maximum length of a Kubernetes object name that must also be a DNS-1035 label (Services)
pub const MAX_RESOURCE_NAME_LEN: usize = 63;

/// Maximum length of a user-chosen logical server name
pub const MAX_LOGICAL_NAME_LEN: usize = 40;

/// Length of the random suffix used when no name is supplied
pub const GENERATED_NAME_SUFFIX_LEN: usize = 6;

/// Suffix appended to an imported server name on a Rename conflict resolution
pub const IMPORT_RENAME_SUFFIX: &str = "imported";

/// Suffix of the per-server `ConfigMap` for NAS servers
pub const CONFIG_MAP_SUFFIX: &str = "config";

/// Suffix of the short-lived storage cleanup `Pod`
pub const CLEANUP_POD_SUFFIX: &str = "cleanup";

// ============================================================================
// Port Constants
// ============================================================================

/// Lowest port of the default Kubernetes NodePort allocation range
pub const NODE_PORT_MIN: i32 = 30000;

/// Highest port of the default Kubernetes NodePort allocation range
pub const NODE_PORT_MAX: i32 = 32767;

/// FTP control port
pub const FTP_PORT: u16 = 21;

/// SSH/SFTP port
pub const SFTP_PORT: u16 = 22;

/// S3 (MinIO) API port
pub const S3_API_PORT: u16 = 9000;

/// S3 (MinIO) console port
pub const S3_CONSOLE_PORT: u16 = 9001;

/// WebDAV HTTP port
pub const HTTP_PORT: u16 = 80;

/// SMB port
pub const SMB_PORT: u16 = 445;

/// NFSv4 port
pub const NFS_PORT: u16 = 2049;

// ============================================================================
// Container Image Constants
// ============================================================================

/// Image for FTP servers
pub const FTP_IMAGE: &str = "fauria/vsftpd:latest";

/// Image for SFTP servers
pub const SFTP_IMAGE: &str = "atmoz/sftp:alpine";

/// Image for S3-compatible servers
pub const S3_IMAGE: &str = "minio/minio:latest";

/// Image for HTTP/WebDAV servers
pub const HTTP_IMAGE: &str = "bytemark/webdav:latest";

/// Image for SMB servers
pub const SMB_IMAGE: &str = "dperson/samba:latest";

/// Image for NFS servers
pub const NFS_IMAGE: &str = "itsthenetwork/nfs-server-alpine:latest";

/// Image for the storage cleanup `Pod`
pub const CLEANUP_IMAGE: &str = "busybox:1.36";

// ============================================================================
// Storage Constants
// ============================================================================

/// Mount path of the shared NAS volume inside the cleanup `Pod`
pub const CLEANUP_MOUNT_PATH: &str = "/data";

/// Volume name of the shared NAS volume
pub const VOLUME_NAS_DATA: &str = "nas-data";

/// Volume name of the NAS configuration `ConfigMap`
pub const VOLUME_NAS_CONFIG: &str = "nas-config";

/// Mount path of the NAS configuration `ConfigMap`
pub const NAS_CONFIG_MOUNT_PATH: &str = "/etc/transfersim";

/// Default NFS export options
pub const DEFAULT_NFS_EXPORT_OPTIONS: &str = "rw,sync,no_subtree_check,no_root_squash";

/// Minimum password length accepted by the S3 server image
pub const S3_MIN_PASSWORD_LEN: usize = 8;

// ============================================================================
// Timeout Constants
// ============================================================================

/// Default timeout of a single cluster API call
pub const DEFAULT_CLUSTER_TIMEOUT_SECS: u64 = 10;

/// Default timeout budget of one import item
pub const DEFAULT_IMPORT_ITEM_TIMEOUT_SECS: u64 = 120;

/// Default time to wait for foreground deletion and storage cleanup
pub const DEFAULT_DELETION_TIMEOUT_SECS: u64 = 120;

/// Poll interval while waiting for deletions and cleanup pods
pub const DELETION_POLL_INTERVAL_MILLIS: u64 = 500;

/// Window during which a restarted server without ready replicas reports `Restarting`
pub const RESTART_GRACE_SECS: i64 = 120;

// ============================================================================
// Kubernetes API Constants
// ============================================================================

/// Page size for paginated list calls
pub const KUBE_LIST_PAGE_SIZE: u32 = 100;

/// Field manager name for patches
pub const FIELD_MANAGER: &str = "transfersim-control-api";

// ============================================================================
// Export Constants
// ============================================================================

/// Version tag written into configuration exports
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

// ============================================================================
// HTTP Server Constants
// ============================================================================

/// Default bind address of the control API
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;
