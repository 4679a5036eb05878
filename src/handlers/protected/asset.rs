use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::format::{list_to_api_value, ApiView};
use crate::database::Scope;
use crate::middleware::{ApiResponse, ApiResult, Authorized, Intent};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReadQuery {
    /// `deleted=true` lets reads see tombstones
    pub deleted: Option<String>,
}

impl ReadQuery {
    pub fn include_deleted(&self) -> bool {
        matches!(self.deleted.as_deref(), Some("true") | Some("1"))
    }

    pub fn scope(&self) -> Scope {
        if self.include_deleted() {
            Scope::IncludeDeleted
        } else {
            Scope::Active
        }
    }

    pub fn intent(&self) -> Intent {
        if self.include_deleted() {
            Intent::ReadDeleted
        } else {
            Intent::Access
        }
    }
}

/// GET /{nouns} - Without a token only `{noun, count}` is returned; with one
/// a superuser sees every asset and a breeder only their own.
pub async fn list<T: ApiView>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ReadQuery>,
) -> ApiResult<Value> {
    if !headers.contains_key(AUTHORIZATION) {
        let count = state.services.count::<T>().await?;
        return Ok(ApiResponse::success(json!({
            "noun": T::NOUN,
            "count": count,
        })));
    }

    let identity = state.gate.require_any_valid_breeder_token(&headers).await?;
    let assets = state.services.list::<T>(&identity, query.scope()).await?;
    Ok(ApiResponse::success(list_to_api_value(&assets)))
}

/// GET /{nouns}/:id - Owner or superuser
pub async fn show<T: ApiView>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> ApiResult<Value> {
    let Authorized { asset, .. } = state
        .gate
        .require_asset_owner_or_superuser::<T>(&headers, &id, query.intent())
        .await?;
    Ok(ApiResponse::success(asset.to_api_value()))
}

/// Associated plural reads answer 204 when there is nothing to show
pub fn plural<T: ApiView>(assets: &[T]) -> ApiResponse<Value> {
    if assets.is_empty() {
        ApiResponse::no_content(Value::Null)
    } else {
        ApiResponse::success(list_to_api_value(assets))
    }
}
