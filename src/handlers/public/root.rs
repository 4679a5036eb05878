use axum::extract::State;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// GET / - Service descriptor
pub async fn root() -> ApiResponse<Value> {
    ApiResponse::success(json!({
        "name": "Kennel API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Dog-breeding records: breeders, dogs, litters and their images",
        "endpoints": {
            "auth": "/auth/login (public), /auth/whoami (token)",
            "breeders": "/breeders[/:id[/dogs|/litters|/restore]]",
            "dogs": "/dogs[/:id[/breeder|/restore]]",
            "litters": "/litters[/:id[/pups|/breeder|/restore]]",
            "images": "/images[/:id[/restore]], /images/upload/:breederId",
            "health": "/health (public)",
        }
    }))
}

/// GET /health - 200 while the store answers, 503 otherwise
pub async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    if let Err(e) = state.store.health_check().await {
        tracing::error!("Health check failed: {}", e);
        return Err(ApiError::service_unavailable("Store unavailable"));
    }
    Ok(ApiResponse::success(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    })))
}
