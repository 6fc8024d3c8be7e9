// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP control API.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET | `/health` | liveness |
//! | GET | `/metrics` | Prometheus metrics |
//! | GET | `/protocols` | blueprint catalogue |
//! | GET | `/servers` | list servers |
//! | GET | `/servers/{name}` | one server |
//! | POST | `/servers/{protocol}` | create server |
//! | DELETE | `/servers/{name}?deleteData=` | delete server |
//! | POST | `/servers/{name}/{action}` | start, stop or restart |
//! | GET | `/configuration/export?format=` | export as JSON or YAML |
//! | POST | `/configuration/import` | import |
//! | GET | `/discovery` | discovery document from a fresh scan |
//!
//! `POST /servers/{protocol}` and `GET /servers/{name}` share one route; the
//! segment is read as a protocol only for POST.

use crate::blueprints::{catalogue, BlueprintInfo};
use crate::constants::METRICS_SERVER_PATH;
use crate::errors::{ServerError, ServerResult};
use crate::lifecycle::LifecycleManager;
use crate::metrics;
use crate::protocol::Protocol;
use crate::sync;
use crate::transfer;
use crate::types::{
    DiscoveredServer, ImportRequest, ImportResult, LifecycleAction, ServerCreationRequest,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<LifecycleManager>,
}

impl AppState {
    #[must_use]
    pub fn new(manager: LifecycleManager) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct ProtocolQuery {
    protocol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteQuery {
    #[serde(default)]
    delete_data: bool,
    protocol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

/// Serialization of a configuration export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    Json,
    Yaml,
}

impl ExportFormat {
    fn parse(format: Option<&str>) -> ServerResult<Self> {
        match format.map(str::to_ascii_lowercase).as_deref() {
            None | Some("json") => Ok(ExportFormat::Json),
            Some("yaml" | "yml") => Ok(ExportFormat::Yaml),
            Some(other) => Err(ServerError::validation(format!(
                "unsupported export format '{other}' (expected json or yaml)"
            ))),
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Yaml => "application/yaml",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
        }
    }
}

/// Build the control API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(METRICS_SERVER_PATH, get(metrics_text))
        .route("/protocols", get(protocols))
        .route("/servers", get(list_servers))
        .route(
            "/servers/{name}",
            get(get_server).post(create_server).delete(delete_server),
        )
        .route("/servers/{name}/{action}", post(change_state))
        .route("/configuration/export", get(export_configuration))
        .route("/configuration/import", post(import_configuration))
        .route("/discovery", get(discovery_document))
        .with_state(state)
}

fn parse_protocol(value: &str) -> ServerResult<Protocol> {
    value
        .parse()
        .map_err(|e: crate::protocol::UnknownProtocol| ServerError::validation(e.to_string()))
}

fn optional_protocol(value: Option<&str>) -> ServerResult<Option<Protocol>> {
    value.map(parse_protocol).transpose()
}

/// Unwrap a JSON body, reporting any rejection as a validation error
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ServerResult<T> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ServerError::validation(rejection.body_text())),
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn metrics_text() -> Response {
    match metrics::gather_metrics() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn protocols() -> Json<Vec<BlueprintInfo>> {
    Json(catalogue())
}

async fn list_servers(
    State(state): State<AppState>,
) -> Result<Json<Vec<DiscoveredServer>>, ServerError> {
    state.manager.list_servers().await.map(Json)
}

async fn get_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ProtocolQuery>,
) -> Result<Json<DiscoveredServer>, ServerError> {
    let protocol = optional_protocol(query.protocol.as_deref())?;
    state.manager.find_server(&name, protocol).await.map(Json)
}

async fn create_server(
    State(state): State<AppState>,
    Path(protocol): Path<String>,
    body: Result<Json<ServerCreationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DiscoveredServer>), ServerError> {
    let protocol = parse_protocol(&protocol)?;
    let request = json_body(body)?;
    debug!(protocol = %protocol, name = ?request.name, "Create server requested");
    let server = state.manager.create_server(protocol, request).await?;
    Ok((StatusCode::CREATED, Json(server)))
}

async fn delete_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, ServerError> {
    let protocol = optional_protocol(query.protocol.as_deref())?;
    state
        .manager
        .delete_server(&name, protocol, query.delete_data)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_state(
    State(state): State<AppState>,
    Path((name, action)): Path<(String, String)>,
    Query(query): Query<ProtocolQuery>,
) -> Result<StatusCode, ServerError> {
    let action: LifecycleAction = action.parse()?;
    let protocol = optional_protocol(query.protocol.as_deref())?;
    state
        .manager
        .set_lifecycle_state(&name, protocol, action)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export_configuration(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ServerError> {
    let format = ExportFormat::parse(query.format.as_deref())?;
    let export = transfer::export(&state.manager).await?;

    let body = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&export).map_err(|e| e.to_string()),
        ExportFormat::Yaml => serde_yaml::to_string(&export).map_err(|e| e.to_string()),
    };
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Failed to serialize configuration export");
            return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };

    let disposition = format!(
        "attachment; filename=\"{}-servers-{}.{}\"",
        export.release_name,
        export.exported_at.format("%Y%m%dT%H%M%SZ"),
        format.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

async fn import_configuration(
    State(state): State<AppState>,
    body: Result<Json<ImportRequest>, JsonRejection>,
) -> Result<Json<ImportResult>, ServerError> {
    let request = json_body(body)?;
    transfer::import(&state.manager, request).await.map(Json)
}

async fn discovery_document(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, String>>, ServerError> {
    let manager = &state.manager;
    sync::current_document(manager.gateway(), manager.settings())
        .await
        .map(Json)
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod api_tests;
