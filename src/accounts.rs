//! Registration and login.
//!
//! Both flows run the same stages and stop at the first failure:
//!
//! ```text
//! validate input → rate limit → domain rule → hash/compare → issue token
//! ```
//!
//! Nothing after a failed stage runs. A taken username never reaches the
//! hasher, and a failed password check never reaches the token codec.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::{PasswordHasher, TokenCodec};
use crate::error::ApiError;
use crate::security::RateLimiter;
use crate::store::{StoreError, UserId, UserRecord, UserStore};
use crate::SharedClock;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 30;
pub const PASSWORD_MIN: usize = 6;
pub const PASSWORD_MAX: usize = 128;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Body of register and login requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AccountView {
    pub id: UserId,
    pub username: String,
}

/// Successful register/login response.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user: AccountView,
}

/// Input that passed field validation.
struct Credentials {
    username: String,
    password: String,
}

pub struct AccountService {
    users: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<TokenCodec>,
    limiter: Arc<RateLimiter>,
    username_pattern: Regex,
    clock: SharedClock,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<TokenCodec>,
        limiter: Arc<RateLimiter>,
        clock: SharedClock,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            users,
            hasher,
            tokens,
            limiter,
            username_pattern: Regex::new(r"^[a-zA-Z0-9_]+$")?,
            clock,
        })
    }

    pub async fn register(
        &self,
        client: &str,
        request: CredentialsRequest,
    ) -> Result<AuthSession, ApiError> {
        let credentials = self.validate(request)?;
        self.check_rate_limit(client, "register", "registration").await?;

        let existing = self
            .users
            .find_by_username(&credentials.username)
            .await
            .map_err(|e| ApiError::from_store(e, "registering"))?;
        if existing.is_some() {
            return Err(ApiError::Conflict("User already exists".to_string()));
        }

        let hash = self.hash_password(credentials.password).await?;
        let user = UserRecord {
            id: UserId::new(),
            username: credentials.username,
            password_hash: hash,
            created_at: self.clock.utc(),
        };

        let user = match self.users.save(user).await {
            Ok(user) => user,
            // Lost a race with a concurrent registration of the same name.
            Err(StoreError::DuplicateKey(_)) => {
                return Err(ApiError::Conflict("Username already exists".to_string()))
            }
            Err(e) => return Err(ApiError::from_store(e, "registering")),
        };

        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        self.session_for(&user)
    }

    pub async fn login(
        &self,
        client: &str,
        request: CredentialsRequest,
    ) -> Result<AuthSession, ApiError> {
        let credentials = self.validate(request)?;
        self.check_rate_limit(client, "login", "login").await?;

        let user = self
            .users
            .find_by_username(&credentials.username)
            .await
            .map_err(|e| ApiError::from_store(e, "logging in"))?;
        let Some(user) = user else {
            tracing::info!(username = %credentials.username, "Login for unknown user");
            return Err(ApiError::validation(INVALID_CREDENTIALS));
        };

        if !self
            .verify_password(credentials.password, user.password_hash.clone())
            .await?
        {
            tracing::info!(user_id = %user.id, "Login with wrong password");
            return Err(ApiError::validation(INVALID_CREDENTIALS));
        }

        tracing::info!(user_id = %user.id, "User logged in");
        self.session_for(&user)
    }

    fn validate(&self, request: CredentialsRequest) -> Result<Credentials, ApiError> {
        let username = self.validate_username(request.username.as_deref())?;
        let password = validate_password(request.password)?;
        Ok(Credentials { username, password })
    }

    /// Returns the normalized (trimmed, lower-cased) username.
    fn validate_username(&self, username: Option<&str>) -> Result<String, ApiError> {
        let Some(username) = username.map(str::trim).filter(|u| !u.is_empty()) else {
            return Err(ApiError::validation("Username is required"));
        };
        let len = username.chars().count();
        if len < USERNAME_MIN {
            return Err(ApiError::validation(
                "Username must be at least 3 characters long",
            ));
        }
        if len > USERNAME_MAX {
            return Err(ApiError::validation(
                "Username must be less than 30 characters",
            ));
        }
        if !self.username_pattern.is_match(username) {
            return Err(ApiError::validation(
                "Username can only contain letters, numbers, and underscores",
            ));
        }
        Ok(username.to_lowercase())
    }

    async fn check_rate_limit(
        &self,
        client: &str,
        action: &str,
        label: &str,
    ) -> Result<(), ApiError> {
        if self.limiter.admit(client, action).await {
            return Ok(());
        }
        Err(ApiError::RateLimited {
            message: format!("Too many {label} attempts. Please try again later."),
            retry_after_minutes: self.limiter.retry_after_minutes(),
        })
    }

    async fn hash_password(&self, password: String) -> Result<String, ApiError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Password hashing task failed");
                ApiError::Internal("Server error during registration".to_string())
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "Password hashing failed");
                ApiError::Internal("Server error during registration".to_string())
            })
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, ApiError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Password verification task failed");
                ApiError::Internal("Server error during login".to_string())
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "Stored password hash unreadable");
                ApiError::Internal("Server error during login".to_string())
            })
    }

    fn session_for(&self, user: &UserRecord) -> Result<AuthSession, ApiError> {
        let issued = self.tokens.issue(&user.id).map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "Token signing failed");
            ApiError::Internal("Error generating token".to_string())
        })?;

        Ok(AuthSession {
            token: issued.token,
            user: AccountView {
                id: user.id,
                username: user.username.clone(),
            },
        })
    }
}

fn validate_password(password: Option<String>) -> Result<String, ApiError> {
    let Some(password) = password.filter(|p| !p.is_empty()) else {
        return Err(ApiError::validation("Password is required"));
    };
    let len = password.chars().count();
    if len < PASSWORD_MIN {
        return Err(ApiError::validation(
            "Password must be at least 6 characters long",
        ));
    }
    if len > PASSWORD_MAX {
        return Err(ApiError::validation(
            "Password must be less than 128 characters",
        ));
    }
    Ok(password)
}
