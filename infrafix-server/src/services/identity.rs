//! Registration, login and bearer-token verification

use chrono::Duration;
use infrafix_common::api::{hash_password, issue_token, verify_password, verify_token, TokenClaims};
use infrafix_common::db::{Role, User};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::users;
use crate::error::{ApiError, ApiResult};

/// Authenticated identity attached to a request by the auth middleware
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_contractor(&self) -> bool {
        self.role == Role::Contractor
    }
}

impl From<TokenClaims> for Caller {
    fn from(claims: TokenClaims) -> Self {
        Self {
            id: claims.id,
            name: claims.name,
            email: claims.email,
            role: claims.role,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Fresh profile returned by `me`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Self-registration role: absent means citizen; administrators are never self-registered
pub fn parse_registration_role(role: Option<&str>) -> ApiResult<Role> {
    match role.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(Role::Citizen),
        Some(raw) => match raw.parse::<Role>()? {
            Role::Admin => Err(ApiError::Forbidden(
                "Administrator accounts cannot be self-registered".to_string(),
            )),
            role => Ok(role),
        },
    }
}

// Argon2 is CPU-bound; run it on the blocking pool
async fn hash_password_blocking(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("Hashing task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn verify_password_blocking(password: String, stored: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("Verification task failed: {}", e)))
}

pub struct IdentityService {
    db: SqlitePool,
    shared_secret: i64,
    token_ttl: Duration,
}

impl IdentityService {
    pub fn new(db: SqlitePool, shared_secret: i64, token_ttl_days: i64) -> Self {
        Self {
            db,
            shared_secret,
            token_ttl: Duration::days(token_ttl_days),
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> ApiResult<TokenResponse> {
        let name = request.name.trim();
        let email = request.email.trim();
        if name.is_empty() || email.is_empty() || request.password.is_empty() {
            return Err(ApiError::Validation(
                "Name, email and password are required".to_string(),
            ));
        }
        let role = parse_registration_role(request.role.as_deref())?;

        let user = self.create_user(name, email, &request.password, role).await?;
        info!(user_id = user.id, role = %user.role, "Registered user");
        Ok(self.token_for(&user))
    }

    /// Provision an administrator outside the HTTP surface
    pub async fn create_admin(&self, name: &str, email: &str, password: &str) -> ApiResult<User> {
        if name.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
            return Err(ApiError::Validation(
                "Name, email and password are required".to_string(),
            ));
        }
        let user = self
            .create_user(name.trim(), email.trim(), password, Role::Admin)
            .await?;
        info!(user_id = user.id, "Created administrator");
        Ok(user)
    }

    async fn create_user(&self, name: &str, email: &str, password: &str, role: Role) -> ApiResult<User> {
        if users::email_exists(&self.db, email).await? {
            return Err(ApiError::Validation("Email already in use".to_string()));
        }

        let hashed = hash_password_blocking(password.to_string()).await?;
        match users::insert_user(&self.db, name, email, &hashed, role).await {
            Ok(user) => Ok(user),
            // Lost a race with a concurrent registration of the same email
            Err(infrafix_common::Error::Database(e)) if users::is_unique_violation(&e) => {
                Err(ApiError::Validation("Email already in use".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn login(&self, request: LoginRequest) -> ApiResult<TokenResponse> {
        let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

        let user = users::find_user_by_email(&self.db, request.email.trim())
            .await?
            .ok_or_else(invalid)?;
        if !verify_password_blocking(request.password, user.password_hash.clone()).await? {
            debug!(user_id = user.id, "Password mismatch");
            return Err(invalid());
        }

        Ok(self.token_for(&user))
    }

    pub async fn me(&self, caller: &Caller) -> ApiResult<Profile> {
        let user = users::find_user(&self.db, caller.id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("User {} not found", caller.id)))?;

        Ok(Profile {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        })
    }

    /// Verify a bearer token and return the identity it carries
    pub fn authenticate(&self, token: &str) -> ApiResult<Caller> {
        let now = infrafix_common::time::now().timestamp();
        verify_token(token, self.shared_secret, now)
            .map(Caller::from)
            .map_err(|e| {
                debug!(error = %e, "Rejected bearer token");
                ApiError::Unauthorized("Invalid or expired token".to_string())
            })
    }

    fn token_for(&self, user: &User) -> TokenResponse {
        let claims = TokenClaims {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            exp: (infrafix_common::time::now() + self.token_ttl).timestamp(),
        };
        TokenResponse {
            token: issue_token(&claims, self.shared_secret),
        }
    }
}
