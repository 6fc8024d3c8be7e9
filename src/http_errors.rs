// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Mapping of [`ServerError`] to HTTP responses.
//!
//! | Error | HTTP Code | Reason |
//! |-------|-----------|--------|
//! | `Validation` | 400 | `ValidationError` |
//! | `Protection` | 403 | `ProtectionError` |
//! | `NotFound` | 404 | `NotFound` |
//! | `Conflict` | 409 | `ConflictError` |
//! | `InvalidTransition` | 409 | `InvalidTransition` |
//! | `PartialFailure` | 500 | `PartialFailureError` |
//! | `Cluster` | 500 | `ClusterError` |
//! | `TransientCluster` | 503 | `TransientClusterError` |
//!
//! Partial failures carry the list of completed objects and the failed step in
//! the body so a caller can reconcile.

use crate::errors::ServerError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

/// JSON body of every error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Machine-readable reason
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
}

/// HTTP status code for a server error
#[must_use]
pub fn status_for(err: &ServerError) -> StatusCode {
    match err {
        ServerError::Validation(_) => StatusCode::BAD_REQUEST,
        ServerError::Protection { .. } => StatusCode::FORBIDDEN,
        ServerError::NotFound(_) => StatusCode::NOT_FOUND,
        ServerError::Conflict { .. } | ServerError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        ServerError::PartialFailure { .. } | ServerError::Cluster(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ServerError::TransientCluster(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Error body for a server error
#[must_use]
pub fn body_for(err: &ServerError) -> ErrorBody {
    let (completed, failed_step) = match err {
        ServerError::PartialFailure {
            completed,
            failed_step,
            ..
        } => (Some(completed.clone()), Some(failed_step.clone())),
        _ => (None, None),
    };
    ErrorBody {
        error: err.reason(),
        message: err.to_string(),
        completed,
        failed_step,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(reason = self.reason(), error = %self, "Request failed");
        }
        (status, Json(body_for(&self))).into_response()
    }
}

#[cfg(test)]
#[path = "http_errors_tests.rs"]
mod http_errors_tests;
