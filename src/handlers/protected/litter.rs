use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;

use super::asset::plural;
use crate::api::format::{update_to_api_value, ApiView};
use crate::database::models::Litter;
use crate::middleware::{ApiResponse, ApiResult, Authorized, Intent};
use crate::state::AppState;

/// POST /litters
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

    let litter = state.services.litters.create(body).await?;
    Ok(ApiResponse::created(litter.to_api_value()))
}

/// PUT /litters/:id - A `pups` array replaces the litter's pups; dogs that
/// drop out have their `litterId` cleared
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let Authorized { asset, .. } = state
        .gate
        .require_asset_owner_or_superuser::<Litter>(&headers, &id, Intent::Access)
        .await?;
    let Json(body) = body?;

    let (fields, updated) = state.services.litters.update(&asset, body).await?;
    Ok(ApiResponse::success(update_to_api_value(&fields, &updated)))
}

/// DELETE /litters/:id
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let Authorized { asset, .. } = state
        .gate
        .require_asset_owner_or_superuser::<Litter>(&headers, &id, Intent::Access)
        .await?;

    let snapshot = state.services.cascade.delete_litter(&asset).await?;
    Ok(ApiResponse::success(snapshot.to_api_value()))
}

/// POST /litters/:id/restore
pub async fn restore(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let Authorized { asset, .. } = state
        .gate
        .require_asset_owner_or_superuser::<Litter>(&headers, &id, Intent::Restore)
        .await?;

    let restored = state.services.cascade.restore_litter(&asset).await?;
    Ok(ApiResponse::created(restored.to_api_value()))
}

/// GET /litters/:id/pups
pub async fn pups(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    state
        .gate
        .require_asset_owner_or_superuser::<Litter>(&headers, &id, Intent::Access)
        .await?;
    let pups = state.services.pups_of_litter(&id).await?;
    Ok(plural(&pups))
}

/// GET /litters/:id/breeder
pub async fn breeder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let Authorized { asset, .. } = state
        .gate
        .require_asset_owner_or_superuser::<Litter>(&headers, &id, Intent::Access)
        .await?;

    let breeder = state.services.breeder_of(&asset.breeder_id).await?;
    Ok(ApiResponse::success(breeder.to_api_value()))
}
