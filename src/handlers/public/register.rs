use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;

use crate::api::format::ApiView;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// POST /breeders - Public registration.
///
/// A body asking for `superuser: true` must carry a valid breeder token;
/// whether that token is a superuser's is decided by the breeder service.
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = body?;

    let requester = if body.get("superuser") == Some(&Value::Bool(true)) {
        Some(state.gate.require_any_valid_breeder_token(&headers).await?)
    } else {
        None
    };

    let breeder = state
        .services
        .breeders
        .create(body, requester.as_ref())
        .await?;
    Ok(ApiResponse::created(breeder.to_api_value()))
}
