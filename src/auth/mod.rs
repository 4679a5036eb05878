pub mod password;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;

/// Caller identity carried by a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub superuser: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    /// Only present for superusers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superuser: Option<bool>,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl Claims {
    pub fn new(identity: &Identity, expiry_hours: Option<u64>) -> Self {
        let now = Utc::now();
        Self {
            id: identity.id.clone(),
            superuser: identity.superuser.then_some(true),
            iat: now.timestamp(),
            exp: expiry_hours.map(|h| (now + Duration::hours(h as i64)).timestamp()),
        }
    }
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            superuser: claims.superuser.unwrap_or(false),
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("JWT generation error: {0}")]
    Generation(String),

    #[error("Invalid JWT secret")]
    InvalidSecret,

    #[error("Invalid token: {0}")]
    Verification(String),
}

/// HS256 signer/verifier over the configured secret
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: Option<u64>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("expiry_hours", &self.expiry_hours)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str, expiry_hours: Option<u64>) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::InvalidSecret);
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        })
    }

    pub fn from_config(security: &SecurityConfig) -> Result<Self, TokenError> {
        Self::new(&security.jwt_secret, security.jwt_expiry_hours)
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, TokenError> {
        let claims = Claims::new(identity, self.expiry_hours);
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Generation(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let mut validation = Validation::default();
        // `exp` is only checked when present
        validation.required_spec_claims.clear();

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| TokenError::Verification(e.to_string()))?;
        Ok(token_data.claims.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breeder(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            superuser: false,
        }
    }

    #[test]
    fn issued_tokens_verify() {
        let tokens = TokenService::new("secret", None).unwrap();
        let token = tokens.issue(&breeder("b1")).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), breeder("b1"));
    }

    #[test]
    fn superuser_flag_survives_the_round_trip() {
        let tokens = TokenService::new("secret", Some(1)).unwrap();
        let admin = Identity {
            id: "root".into(),
            superuser: true,
        };
        let token = tokens.issue(&admin).unwrap();
        assert!(tokens.verify(&token).unwrap().superuser);
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let ours = TokenService::new("secret", None).unwrap();
        let theirs = TokenService::new("other", None).unwrap();
        let token = theirs.issue(&breeder("b1")).unwrap();
        assert!(matches!(ours.verify(&token), Err(TokenError::Verification(_))));
        assert!(ours.verify("not-a-jwt").is_err());
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(matches!(TokenService::new("", None), Err(TokenError::InvalidSecret)));
    }
}
