use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::{Identity, TokenError, TokenService};
use crate::database::models::{Asset, Breeder};
use crate::database::{Scope, Store, StoreError};
use crate::error::ApiError;
use crate::types::Noun;

/// Why a request was turned away before reaching its handler
#[derive(Debug, Error)]
pub enum GateRejection {
    #[error("Missing token")]
    MissingToken,

    #[error(transparent)]
    InvalidToken(#[from] TokenError),

    #[error("No {noun} with ID {id}")]
    AssetNotFound { noun: Noun, id: String },

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the caller wants to do with the asset it names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Access,
    /// `?deleted=true` reads may see tombstones
    ReadDeleted,
    /// Restores must see tombstones
    Restore,
}

impl Intent {
    fn scope(self) -> Scope {
        match self {
            Intent::Access => Scope::Active,
            Intent::ReadDeleted | Intent::Restore => Scope::IncludeDeleted,
        }
    }
}

/// An owner-or-superuser check that passed, with the asset it loaded
#[derive(Debug, Clone)]
pub struct Authorized<T> {
    pub identity: Identity,
    pub asset: T,
}

/// Request-scoped authorization decisions.
///
/// Every check except [`Gate::require_any_token`] also requires the token's
/// breeder to exist and be active; a token for a vanished breeder is
/// `Forbidden`, never `NotFound`.
#[derive(Clone)]
pub struct Gate {
    tokens: TokenService,
    store: Store,
}

impl Gate {
    pub fn new(tokens: TokenService, store: Store) -> Self {
        Self { tokens, store }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Any token that verifies, regardless of who it names
    pub fn require_any_token(&self, headers: &HeaderMap) -> Result<Identity, GateRejection> {
        let token = extract_bearer(headers).ok_or(GateRejection::MissingToken)?;
        let identity = self.tokens.verify(token).map_err(|e| {
            warn!("Rejected bearer token: {}", e);
            GateRejection::InvalidToken(e)
        })?;
        debug!(breeder = %identity.id, "Token verified");
        Ok(identity)
    }

    /// A verified token whose breeder is active
    pub async fn require_any_valid_breeder_token(
        &self,
        headers: &HeaderMap,
    ) -> Result<Identity, GateRejection> {
        let identity = self.require_any_token(headers)?;
        self.require_active_breeder(&identity).await?;
        Ok(identity)
    }

    /// Load `T` by id and let through only its owner or a superuser
    pub async fn require_asset_owner_or_superuser<T: Asset>(
        &self,
        headers: &HeaderMap,
        id: &str,
        intent: Intent,
    ) -> Result<Authorized<T>, GateRejection> {
        let identity = self.require_any_valid_breeder_token(headers).await?;

        let asset = T::repository(&self.store)
            .find_by_id(id, intent.scope())
            .await?
            .ok_or_else(|| GateRejection::AssetNotFound {
                noun: T::NOUN,
                id: id.to_string(),
            })?;

        if !identity.superuser && asset.owner_id() != identity.id {
            debug!(breeder = %identity.id, noun = %T::NOUN, id, "Ownership check failed");
            return Err(GateRejection::Forbidden(format!(
                "Token does not match {} owner",
                T::NOUN
            )));
        }

        debug!(breeder = %identity.id, noun = %T::NOUN, id, ?intent, "Authorized");
        Ok(Authorized { identity, asset })
    }

    /// Creating on behalf of `requested_breeder_id` needs that breeder's token or a superuser's
    pub async fn require_creation_authorized(
        &self,
        headers: &HeaderMap,
        requested_breeder_id: Option<&str>,
    ) -> Result<Identity, GateRejection> {
        let identity = self.require_any_valid_breeder_token(headers).await?;
        if identity.superuser || requested_breeder_id == Some(identity.id.as_str()) {
            return Ok(identity);
        }
        Err(GateRejection::Forbidden(
            "Token does not match breederId".to_string(),
        ))
    }

    async fn require_active_breeder(&self, identity: &Identity) -> Result<Breeder, GateRejection> {
        self.store
            .breeders
            .find_by_id(&identity.id, Scope::Active)
            .await?
            .ok_or_else(|| {
                warn!(breeder = %identity.id, "Token names a breeder that is missing or deleted");
                GateRejection::Forbidden("Token does not belong to an active breeder".to_string())
            })
    }
}

/// Token of a `Bearer <token>` or older `Bearer: <token>` Authorization
/// header. Other schemes carry no token.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let mut words = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .split_whitespace();
    let scheme = words.next()?;
    if !scheme.trim_end_matches(':').eq_ignore_ascii_case("bearer") {
        return None;
    }
    words.next()
}

/// Route layer for endpoints that only need a verified token; the identity
/// is injected into request extensions.
pub async fn jwt_auth_middleware(
    State(gate): State<Gate>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = gate.require_any_token(&headers)?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
