//! HTTP control surface, health checks and Prometheus metrics

use crate::service::{CrashdumpService, ServiceError};
use crashdump_lib::{
    health::{ComponentStatus, HealthRegistry},
    CollectionSummary, StoreError, StoredLog, TriggerType,
};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub service: CrashdumpService,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, service: CrashdumpService) -> Self {
        Self {
            health_registry,
            service,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub trigger_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub status: String,
    pub trigger_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub busy: bool,
    pub last: Option<CollectionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Busy => StatusCode::CONFLICT,
            ServiceError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Store(StoreError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Store(StoreError::Io { .. })
            | ServiceError::Serialize(_)
            | ServiceError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Start a collection; the document is stored when it completes
async fn trigger_collection(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TriggerRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let trigger = TriggerType::from(request.trigger_type);
    let _handle = state.service.trigger(trigger.clone()).await?;
    info!(trigger = %trigger, "Collection accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            status: "started".to_string(),
            trigger_type: trigger.to_string(),
        }),
    ))
}

async fn collection_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        busy: state.service.is_busy(),
        last: state.service.last_summary(),
    })
}

async fn list_logs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StoredLog>>, ServiceError> {
    Ok(Json(state.service.list_logs()?))
}

async fn read_log(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ServiceError> {
    let contents = state.service.read_log(&name)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        contents,
    )
        .into_response())
}

async fn delete_logs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DeleteResponse>, ServiceError> {
    let deleted = state.service.delete_logs()?;
    Ok(Json(DeleteResponse { deleted }))
}

/// Host reset notification from the platform
async fn host_reset(State(state): State<Arc<AppState>>) -> StatusCode {
    state.service.notify_reset();
    StatusCode::NO_CONTENT
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/crashdump", post(trigger_collection))
        .route("/crashdump/status", get(collection_status))
        .route("/crashdump/logs", get(list_logs).delete(delete_logs))
        .route("/crashdump/logs/:name", get(read_log))
        .route("/host/reset", post(host_reset))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ServiceError::Busy.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ServiceError::Unavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::Store(StoreError::InvalidName("..".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Store(StoreError::NotFound("x.json".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        let io = StoreError::Io {
            path: PathBuf::from("/tmp/x"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert_eq!(
            ServiceError::Store(io).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
