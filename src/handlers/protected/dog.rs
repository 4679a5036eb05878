use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;

use crate::api::format::{update_to_api_value, ApiView};
use crate::database::models::Dog;
use crate::middleware::{ApiResponse, ApiResult, Authorized, Intent};
use crate::state::AppState;

/// POST /dogs - The token must belong to the dog's breeder, or a superuser
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    state.gate.require_any_token(&headers)?;
    let Json(body) = body?;
    state
        .gate
        .require_creation_authorized(&headers, body.get("breederId").and_then(Value::as_str))
        .await?;

    let dog = state.services.dogs.create(body).await?;
    Ok(ApiResponse::created(dog.to_api_value()))
}

/// PUT /dogs/:id
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let Authorized { asset, .. } = state
        .gate
        .require_asset_owner_or_superuser::<Dog>(&headers, &id, Intent::Access)
        .await?;
    let Json(body) = body?;

    let (fields, updated) = state.services.dogs.update(&asset, body).await?;
    Ok(ApiResponse::success(update_to_api_value(&fields, &updated)))
}

/// DELETE /dogs/:id
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let Authorized { asset, .. } = state
        .gate
        .require_asset_owner_or_superuser::<Dog>(&headers, &id, Intent::Access)
        .await?;

    let snapshot = state.services.cascade.delete_dog(&asset).await?;
    Ok(ApiResponse::success(snapshot.to_api_value()))
}

/// POST /dogs/:id/restore
pub async fn restore(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let Authorized { asset, .. } = state
        .gate
        .require_asset_owner_or_superuser::<Dog>(&headers, &id, Intent::Restore)
        .await?;

    let restored = state.services.cascade.restore_dog(&asset).await?;
    Ok(ApiResponse::created(restored.to_api_value()))
}

/// GET /dogs/:id/breeder
pub async fn breeder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let Authorized { asset, .. } = state
        .gate
        .require_asset_owner_or_superuser::<Dog>(&headers, &id, Intent::Access)
        .await?;

    let breeder = state.services.breeder_of(&asset.breeder_id).await?;
    Ok(ApiResponse::success(breeder.to_api_value()))
}
