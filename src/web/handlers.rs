//! HTTP request handlers.

use super::AppState;
use crate::notify::NotificationConfig;
use crate::store::{CheckTarget, EndpointSpec, StoreError};
use crate::system::SystemAlertConfig;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn store_error(e: StoreError) -> Response {
    match e {
        StoreError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "Service not found"),
        StoreError::AlreadyExists(_) => error_response(StatusCode::CONFLICT, e.to_string()),
    }
}

/// Reject specs that cannot be checked.
pub fn validate_spec(spec: &EndpointSpec) -> Result<(), String> {
    if spec.name.trim().is_empty() {
        return Err("name is required".to_string());
    }
    match &spec.target {
        CheckTarget::Http { url } if url.trim().is_empty() => Err("url is required".to_string()),
        CheckTarget::Tcp { host, port } | CheckTarget::Udp { host, port } => {
            if host.trim().is_empty() {
                Err("host is required".to_string())
            } else if *port == 0 {
                Err("port must be between 1 and 65535".to_string())
            } else {
                Ok(())
            }
        }
        CheckTarget::Http { .. } => Ok(()),
    }
}

fn parse_spec(payload: Result<Json<EndpointSpec>, JsonRejection>) -> Result<EndpointSpec, Response> {
    let Json(spec) = payload.map_err(|e| error_response(StatusCode::BAD_REQUEST, e.body_text()))?;
    validate_spec(&spec).map_err(|e| error_response(StatusCode::BAD_REQUEST, e))?;
    Ok(spec)
}

// ============================================================================
// API: Services
// ============================================================================

pub async fn list_services(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.endpoints())
}

pub async fn create_service(
    State(state): State<AppState>,
    payload: Result<Json<EndpointSpec>, JsonRejection>,
) -> Response {
    let spec = match parse_spec(payload) {
        Ok(spec) => spec,
        Err(response) => return response,
    };

    match state.engine.create_endpoint(spec).await {
        Ok(endpoint) => (StatusCode::CREATED, Json(endpoint)).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn get_service(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.endpoint(&id) {
        Ok(endpoint) => Json(endpoint).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<EndpointSpec>, JsonRejection>,
) -> Response {
    let spec = match parse_spec(payload) {
        Ok(spec) => spec,
        Err(response) => return response,
    };

    match state.engine.update_endpoint(&id, spec) {
        Ok(endpoint) => Json(endpoint).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn delete_service(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.delete_endpoint(&id) {
        Ok(()) => Json(json!({ "message": "Service deleted successfully" })).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn check_service(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.run_check(&id).await {
        Ok(endpoint) => Json(endpoint).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn service_statistics(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.statistics(&id) {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn service_history(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.history(&id) {
        Ok(history) => Json(history).into_response(),
        Err(e) => store_error(e),
    }
}

// ============================================================================
// API: Telegram
// ============================================================================

pub async fn get_telegram_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.notifier.masked_config())
}

pub async fn update_telegram_config(
    State(state): State<AppState>,
    payload: Result<Json<NotificationConfig>, JsonRejection>,
) -> Response {
    let Json(config) = match payload {
        Ok(config) => config,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
    };

    state.notifier.set_config(config);
    tracing::info!("Notification settings updated");

    Json(json!({
        "message": "Telegram configuration updated successfully",
        "config": state.notifier.masked_config(),
    }))
    .into_response()
}

pub async fn test_telegram(State(state): State<AppState>) -> Response {
    match state.notifier.send_test().await {
        Ok(()) => Json(json!({ "message": "Test notification sent successfully" })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Failed to send test message",
                "details": e.to_string(),
            })),
        )
            .into_response(),
    }
}

// ============================================================================
// API: System
// ============================================================================

pub async fn system_info(State(state): State<AppState>) -> impl IntoResponse {
    let resources = state.resources.clone();
    // Sampling touches /proc and mount tables.
    match tokio::task::spawn_blocking(move || resources.system_info()).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn get_system_alerts(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.resources.config())
}

pub async fn update_system_alerts(
    State(state): State<AppState>,
    payload: Result<Json<SystemAlertConfig>, JsonRejection>,
) -> Response {
    let Json(config) = match payload {
        Ok(config) => config,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
    };

    state.resources.set_config(config);
    Json(state.resources.config()).into_response()
}
