use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;

use crate::api::format::{update_to_api_value, ApiView};
use crate::database::models::Image;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Authorized, Intent};
use crate::services::Upload;
use crate::state::AppState;

/// POST /images/upload/:breederId - Multipart form with an `image` file and
/// optional `dogId`, `litterId` and `alt` text fields
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(breeder_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Value> {
    state
        .gate
        .require_creation_authorized(&headers, Some(&breeder_id))
        .await?;

    let mut upload = Upload::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                upload.file_name = Some(field.file_name().unwrap_or("upload").to_string());
                upload.content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
                upload.bytes = Some(data.to_vec());
            }
            "dogId" | "litterId" | "alt" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
                match name.as_str() {
                    "dogId" => upload.dog_id = Some(text),
                    "litterId" => upload.litter_id = Some(text),
                    _ => upload.alt = Some(text),
                }
            }
            _ => {}
        }
    }

    let image = state.services.images.upload(&breeder_id, upload).await?;
    Ok(ApiResponse::created(image.to_api_value()))
}

/// PUT /images/:id - Only `alt`, `dogId` and `litterId` can change
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let Authorized { asset, .. } = state
        .gate
        .require_asset_owner_or_superuser::<Image>(&headers, &id, Intent::Access)
        .await?;
    let Json(body) = body?;

    let (fields, updated) = state.services.images.update(&asset, body).await?;
    Ok(ApiResponse::success(update_to_api_value(&fields, &updated)))
}

/// DELETE /images/:id - Also removes the stored file
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let Authorized { asset, .. } = state
        .gate
        .require_asset_owner_or_superuser::<Image>(&headers, &id, Intent::Access)
        .await?;

    let snapshot = state.services.cascade.delete_image(&asset).await?;
    Ok(ApiResponse::success(snapshot.to_api_value()))
}

/// POST /images/:id/restore - Always refused once authorized; the file is gone
pub async fn restore(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let Authorized { asset, .. } = state
        .gate
        .require_asset_owner_or_superuser::<Image>(&headers, &id, Intent::Restore)
        .await?;

    let restored = state.services.cascade.restore_image(&asset).await?;
    Ok(ApiResponse::created(restored.to_api_value()))
}
