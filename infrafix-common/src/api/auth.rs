//! Bearer token signing and password hashing
//!
//! # Token format
//!
//! `<payload>.<signature>` where:
//! - `payload` is the canonical JSON of [`TokenClaims`] (sorted keys, no
//!   whitespace), base64url encoded without padding
//! - `signature` is SHA-256 over `payload` followed by the shared secret as a
//!   decimal i64 string, as 64 lowercase hex characters
//!
//! The shared secret lives in the `settings` table under
//! `api_shared_secret` and is generated on first start.
//!
//! # Passwords
//!
//! Argon2id with default parameters, stored as a single PHC string
//! (`$argon2id$v=19$m=...$<salt>$<hash>`) in `users.password_hash`. The salt
//! and cost parameters travel inside the string.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::db::models::Role;

// ========================================
// Error Types
// ========================================

/// Authentication error types
#[derive(Debug, Clone, PartialEq)]
pub enum ApiAuthError {
    /// Token is not `<payload>.<signature>` or payload is not valid claims
    MalformedToken(String),

    /// Signature does not match the payload
    InvalidSignature,

    /// Token expiry has passed
    Expired { exp: i64, now: i64 },

    /// Database error loading shared secret
    DatabaseError(String),

    /// Password hashing failed
    HashingError(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::MalformedToken(reason) => write!(f, "Malformed token: {}", reason),
            ApiAuthError::InvalidSignature => write!(f, "Invalid token signature"),
            ApiAuthError::Expired { exp, now } => {
                write!(f, "Token expired at {} (now {})", exp, now)
            }
            ApiAuthError::DatabaseError(err) => write!(f, "Database error: {}", err),
            ApiAuthError::HashingError(err) => write!(f, "Password hashing failed: {}", err),
        }
    }
}

impl std::error::Error for ApiAuthError {}

// ========================================
// Claims
// ========================================

/// Identity carried by a bearer token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Expiry, Unix seconds
    pub exp: i64,
}

// ========================================
// Shared Secret Management
// ========================================

/// Load shared secret from database settings
///
/// Generates and stores a new secret when none exists yet.
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = 'api_shared_secret'")
            .fetch_optional(db)
            .await
            .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match result {
        Some((value,)) => value
            .parse::<i64>()
            .map_err(|e| ApiAuthError::DatabaseError(format!("Invalid i64: {}", e))),
        None => initialize_shared_secret(db).await,
    }
}

/// Generate a non-zero random secret and store it
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    let secret: i64 = {
        let mut rng = rand::thread_rng();
        loop {
            let val = rng.gen::<i64>();
            if val != 0 {
                break val;
            }
        }
    };

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES ('api_shared_secret', ?)")
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    Ok(secret)
}

// ========================================
// Token Issue / Verify
// ========================================

/// Sign claims into a bearer token
pub fn issue_token(claims: &TokenClaims, shared_secret: i64) -> String {
    // Serializing a struct of plain fields cannot fail
    let value = serde_json::to_value(claims).unwrap_or(Value::Null);
    let payload = URL_SAFE_NO_PAD.encode(to_canonical_json(&value));
    let signature = sign(&payload, shared_secret);
    format!("{}.{}", payload, signature)
}

/// Verify signature and expiry, returning the embedded claims
///
/// `now` is Unix seconds.
pub fn verify_token(token: &str, shared_secret: i64, now: i64) -> Result<TokenClaims, ApiAuthError> {
    let (payload, signature) = token
        .split_once('.')
        .ok_or_else(|| ApiAuthError::MalformedToken("missing separator".to_string()))?;

    let expected = sign(payload, shared_secret);
    if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        return Err(ApiAuthError::InvalidSignature);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| ApiAuthError::MalformedToken(e.to_string()))?;
    let claims: TokenClaims =
        serde_json::from_slice(&bytes).map_err(|e| ApiAuthError::MalformedToken(e.to_string()))?;

    if claims.exp <= now {
        return Err(ApiAuthError::Expired { exp: claims.exp, now });
    }

    Ok(claims)
}

fn sign(payload: &str, shared_secret: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(shared_secret.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Convert JSON to canonical form (sorted keys, no whitespace)
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        // serde_json's Display handles string escaping
        other => other.to_string(),
    }
}

// ========================================
// Passwords
// ========================================

/// Hash a password into a PHC string with a fresh random salt
pub fn hash_password(password: &str) -> Result<String, ApiAuthError> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiAuthError::HashingError(e.to_string()))
}

/// Check a password against a stored PHC string
///
/// A stored value that does not parse never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
