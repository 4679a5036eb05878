//! Argon2id password hashing.
//!
//! Each breeder keeps its `SaltString` next to the PHC hash; the hash embeds
//! the same salt, so verification only needs the hash.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hash(String),
}

/// Salted hash ready to store on a breeder
#[derive(Debug, Clone)]
pub struct Credentials {
    pub salt: String,
    pub hash: String,
}

/// Hash `password` under a fresh random salt
pub fn hash(password: &str) -> Result<Credentials, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::Hash(e.to_string()))?;
    Ok(Credentials {
        salt: salt.as_str().to_string(),
        hash: hash.to_string(),
    })
}

/// False for a wrong password and for a hash that does not parse
pub fn verify(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Between 5 and 30 characters inclusive
pub fn is_valid_length(password: &str) -> bool {
    (5..=30).contains(&password.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let credentials = hash("hunter22").unwrap();
        assert!(credentials.hash.starts_with("$argon2id$"));
        assert!(credentials.hash.contains(&credentials.salt));
        assert!(verify("hunter22", &credentials.hash));
        assert!(!verify("hunter23", &credentials.hash));
    }

    #[test]
    fn every_hash_gets_its_own_salt() {
        let a = hash("hunter22").unwrap();
        let b = hash("hunter22").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify("hunter22", "not-a-phc-string"));
        assert!(!verify("hunter22", ""));
    }

    #[test]
    fn length_bounds() {
        assert!(!is_valid_length("abcd"));
        assert!(is_valid_length("abcde"));
        assert!(is_valid_length(&"x".repeat(30)));
        assert!(!is_valid_length(&"x".repeat(31)));
    }
}
