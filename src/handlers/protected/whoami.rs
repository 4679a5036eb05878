use axum::Extension;

use crate::auth::Identity;
use crate::middleware::{ApiResponse, ApiResult};

/// GET /auth/whoami - Echo the identity carried by the token.
///
/// Runs behind `jwt_auth_middleware`, which only checks that the token
/// verifies; the breeder it names may no longer exist.
pub async fn whoami(Extension(identity): Extension<Identity>) -> ApiResult<Identity> {
    Ok(ApiResponse::success(identity))
}
