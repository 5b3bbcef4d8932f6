//! Credential hashing and bearer tokens.
//!
//! Passwords are stored as argon2 PHC strings. Tokens are
//! `v1.<payload>.<signature>` where the payload is base64url JSON
//! `{uid, exp}` and the signature is HMAC-SHA256 over the payload part.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION_V1: &str = "v1";
const MAX_TOKEN_LEN: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token version is not supported")]
    UnsupportedVersion,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token signing key rejected")]
    InvalidKey,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub uid: i64,
    pub exp: u64,
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    // uuid v4 bytes are drawn from the OS rng, which is all a salt needs.
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| anyhow::anyhow!("salt encoding failed: {e}"))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// An unparsable stored hash counts as a mismatch.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn issue_token(user_id: i64, secret: &[u8], ttl_secs: u64) -> Result<String, TokenError> {
    sign_claims(
        &TokenClaims {
            uid: user_id,
            exp: unix_now().saturating_add(ttl_secs),
        },
        secret,
    )
}

fn sign_claims(claims: &TokenClaims, secret: &[u8]) -> Result<String, TokenError> {
    let payload = serde_json::to_vec(claims).map_err(|_| TokenError::Malformed)?;
    let payload_part = URL_SAFE_NO_PAD.encode(payload);
    let sig_part = URL_SAFE_NO_PAD.encode(signature(payload_part.as_bytes(), secret)?);
    Ok(format!("{}.{}.{}", TOKEN_VERSION_V1, payload_part, sig_part))
}

fn signature(payload_part: &[u8], secret: &[u8]) -> Result<Vec<u8>, TokenError> {
    let mut mac = mac_for(secret)?;
    mac.update(payload_part);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn mac_for(secret: &[u8]) -> Result<HmacSha256, TokenError> {
    <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| TokenError::InvalidKey)
}

pub fn verify_token(token: &str, secret: &[u8]) -> Result<TokenClaims, TokenError> {
    verify_token_at(token, secret, unix_now())
}

pub fn verify_token_at(token: &str, secret: &[u8], now: u64) -> Result<TokenClaims, TokenError> {
    if token.len() > MAX_TOKEN_LEN {
        return Err(TokenError::Malformed);
    }
    let mut parts = token.trim().split('.');
    let (Some(version), Some(payload_part), Some(sig_part), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };
    if version != TOKEN_VERSION_V1 {
        return Err(TokenError::UnsupportedVersion);
    }

    let expected = URL_SAFE_NO_PAD
        .decode(sig_part)
        .map_err(|_| TokenError::Malformed)?;
    let mut mac = mac_for(secret)?;
    mac.update(payload_part.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| TokenError::BadSignature)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_part)
        .map_err(|_| TokenError::Malformed)?;
    let claims: TokenClaims =
        serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;
    if claims.exp <= now {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}
