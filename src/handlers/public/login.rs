use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::format::ApiView;
use crate::auth::Identity;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::Login;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// POST /auth/login - Exchange email and password for a bearer token
///
/// Success: `{"user": breeder, "token": "..."}`. An unknown email is 404,
/// a wrong password is 401.
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = body?;

    let missing: Vec<&str> = [("email", &request.email), ("password", &request.password)]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
        .map(|(field, _)| field)
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::bad_request(format!(
            "Missing required field(s): {}",
            missing.join(" ")
        )));
    }
    let email = request.email.unwrap_or_default();
    let password = request.password.unwrap_or_default();

    let breeder = match state.services.breeders.authenticate(&email, &password).await? {
        Login::Authenticated(breeder) => breeder,
        Login::UnknownEmail => {
            return Err(ApiError::not_found("No user found with those credentials"));
        }
        Login::WrongPassword => {
            warn!(email = %email, "Failed login");
            return Err(ApiError::unauthorized("Failed Login"));
        }
    };

    let identity = Identity {
        id: breeder.id.clone(),
        superuser: breeder.superuser,
    };
    let token = state.gate.tokens().issue(&identity).map_err(|e| {
        tracing::error!("Token generation failed: {}", e);
        ApiError::internal_server_error("Failed to generate token")
    })?;

    info!(breeder = %breeder.id, "Breeder logged in");
    Ok(ApiResponse::success(json!({
        "user": breeder.to_api_value(),
        "token": token,
    })))
}
