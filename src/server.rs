use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    error::ServiceError,
    model::{GenerationRequest, GenerationService, ModelMetadata},
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GenerationService>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<ModelMetadata>,
}

pub fn build_router(service: Arc<GenerationService>) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/health", get(health))
        .route("/generate", post(generate))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Readiness surface: `ok` only once the model is fully loaded, so
/// orchestration can hold traffic back during startup or after a failed
/// load.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if state.service.is_ready() {
        let body = HealthResponse {
            status: "ok",
            model: state.service.metadata(),
        };
        (StatusCode::OK, Json(body))
    } else {
        let body = HealthResponse {
            status: state.service.state().as_str(),
            model: None,
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}

async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Result<Json<crate::model::GenerationResponse>, ServiceError> {
    let response = state.service.handle(request).await?;
    Ok(Json(response))
}
