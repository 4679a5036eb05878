use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;

use super::asset::plural;
use crate::api::format::{cascade_to_api_value, update_to_api_value};
use crate::database::models::Breeder;
use crate::middleware::{ApiResponse, ApiResult, Authorized, Intent};
use crate::state::AppState;

/// PUT /breeders/:id
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let Authorized { identity, asset } = state
        .gate
        .require_asset_owner_or_superuser::<Breeder>(&headers, &id, Intent::Access)
        .await?;
    let Json(body) = body?;

    let (fields, updated) = state
        .services
        .breeders
        .update(&asset, body, &identity)
        .await?;
    Ok(ApiResponse::success(update_to_api_value(&fields, &updated)))
}

/// DELETE /breeders/:id - Superuser only; takes the breeder's dogs, litters
/// and images with it
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let Authorized { identity, asset } = state
        .gate
        .require_asset_owner_or_superuser::<Breeder>(&headers, &id, Intent::Access)
        .await?;

    let cascade = state
        .services
        .cascade
        .delete_breeder(&asset, identity.superuser)
        .await?;
    Ok(ApiResponse::success(cascade_to_api_value(&cascade)))
}

/// POST /breeders/:id/restore - Superuser only
pub async fn restore(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let Authorized { identity, asset } = state
        .gate
        .require_asset_owner_or_superuser::<Breeder>(&headers, &id, Intent::Restore)
        .await?;

    let cascade = state
        .services
        .cascade
        .restore_breeder(&asset, identity.superuser)
        .await?;
    Ok(ApiResponse::created(cascade_to_api_value(&cascade)))
}

/// GET /breeders/:id/dogs - Sorted by name
pub async fn dogs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    state
        .gate
        .require_asset_owner_or_superuser::<Breeder>(&headers, &id, Intent::Access)
        .await?;
    let dogs = state.services.dogs_of_breeder(&id).await?;
    Ok(plural(&dogs))
}

/// GET /breeders/:id/litters
pub async fn litters(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    state
        .gate
        .require_asset_owner_or_superuser::<Breeder>(&headers, &id, Intent::Access)
        .await?;
    let litters = state.services.litters_of_breeder(&id).await?;
    Ok(plural(&litters))
}
