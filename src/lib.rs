// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # transfersim - Control plane for simulated file-transfer servers
//!
//! transfersim runs FTP, SFTP, S3, HTTP/WebDAV, SMB and NFS servers inside a
//! Kubernetes namespace for integration testing, and exposes an HTTP API to
//! create, delete, start, stop and restart them at runtime.
//!
//! ## Overview
//!
//! - Servers deployed with the Helm chart are **static**: they are discovered
//!   and listed, but never mutated by the API.
//! - Servers created through the API are **dynamic**: each is a Deployment plus
//!   a NodePort Service (and a `ConfigMap` for SMB/NFS) bound to the running
//!   control-plane pod.
//! - A service discovery `ConfigMap` is republished after every mutation.
//! - The full server set can be exported and re-imported with per-item
//!   conflict resolution.
//!
//! The cluster is the only store. Every request re-reads it.
//!
//! ## Modules
//!
//! - [`gateway`] - Typed access to Deployments, Services, `ConfigMap`s and Pods
//! - [`naming`] - Logical names, resource names and NodePort validation
//! - [`blueprints`] - Per-protocol templates and object builders
//! - [`discovery`] - Server discovery and static/dynamic classification
//! - [`sync`] - Service discovery document
//! - [`lifecycle`] - Create, delete, start, stop and restart
//! - [`transfer`] - Configuration export and import
//! - [`api`] - HTTP API
//!
//! ## Example
//!
//! ```rust,no_run
//! use transfersim::naming::resource_name;
//! use transfersim::protocol::Protocol;
//!
//! assert_eq!(resource_name("transfersim", Protocol::Ftp, "primary"), "transfersim-ftp-primary");
//! ```

pub mod api;
pub mod blueprints;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod errors;
pub mod gateway;
pub mod http_errors;
pub mod labels;
pub mod lifecycle;
pub mod metrics;
pub mod naming;
pub mod protocol;
pub mod sync;
pub mod transfer;
pub mod types;

#[cfg(test)]
mod test_support;
