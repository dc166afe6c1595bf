//! Password hashing, bearer tokens and password-reset tokens.
//!
//! Everything here is pure apart from the clock, so callers decide what gets
//! persisted and when.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{error::AppError, models::auth::Claims};

pub const BCRYPT_COST: u32 = 12;
pub const RESET_TOKEN_TTL_MINUTES: i64 = 10;

pub fn hash_password(plain: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(plain, BCRYPT_COST)
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    bcrypt::verify(plain, hash).unwrap_or(false)
}

pub fn issue_token(user_id: Uuid, secret: &str, ttl_seconds: u64) -> anyhow::Result<String> {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + ttl_seconds as usize,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidToken,
        })
}

/// A freshly minted reset token. Only `hash` is ever stored; `plain` goes in the email.
#[derive(Debug, Clone)]
pub struct ResetToken {
    pub plain: String,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

pub fn issue_reset_token() -> ResetToken {
    let plain = hex::encode(rand::random::<[u8; 32]>());
    ResetToken {
        hash: hash_reset_token(&plain),
        plain,
        expires_at: Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
    }
}

pub fn hash_reset_token(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}

/// Recorded one second in the past so a token issued right after the change
/// still passes `changed_password_after`.
pub fn password_changed_at() -> DateTime<Utc> {
    Utc::now() - Duration::seconds(1)
}

pub fn changed_password_after(changed_at: Option<DateTime<Utc>>, iat: usize) -> bool {
    match changed_at {
        Some(changed_at) => (iat as i64) < changed_at.timestamp(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-long-enough";

    #[test]
    fn hashed_password_differs_from_plaintext_and_verifies() {
        let hash = hash_password("abcd1234").unwrap();
        assert_ne!(hash, "abcd1234");
        assert!(verify_password("abcd1234", &hash));
        assert!(!verify_password("abcd12345", &hash));
        assert!(!verify_password("abcd1234", "not-a-bcrypt-hash"));
    }

    #[test]
    fn token_round_trip_carries_subject() {
        let id = Uuid::new_v4();
        let token = issue_token(id, SECRET, 60).unwrap();
        let claims = verify_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, id.to_string());
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let token = issue_token(Uuid::new_v4(), "another-secret", 60).unwrap();
        assert!(matches!(verify_token(&token, SECRET), Err(AppError::InvalidToken)));
        assert!(matches!(verify_token("garbage", SECRET), Err(AppError::InvalidToken)));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let past = (Utc::now().timestamp() - 120) as usize;
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            iat: past - 60,
            exp: past,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(verify_token(&token, SECRET), Err(AppError::TokenExpired)));
    }

    #[test]
    fn reset_token_stores_only_the_digest() {
        let token = issue_reset_token();
        assert_eq!(token.plain.len(), 64);
        assert_ne!(token.plain, token.hash);
        assert_eq!(hash_reset_token(&token.plain), token.hash);
        assert!(token.expires_at > Utc::now() + Duration::minutes(9));
    }

    #[test]
    fn token_issued_before_password_change_is_stale() {
        let changed = Utc::now();
        let before = (changed.timestamp() - 5) as usize;
        let after = (changed.timestamp() + 1) as usize;
        assert!(changed_password_after(Some(changed), before));
        assert!(!changed_password_after(Some(changed), after));
        assert!(!changed_password_after(None, before));
    }

    #[test]
    fn fresh_token_survives_the_change_it_follows() {
        let changed = password_changed_at();
        let iat = Utc::now().timestamp() as usize;
        assert!(!changed_password_after(Some(changed), iat));
    }
}
