//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check required values are present (signing secret, storage URL)
//! - Validate value ranges (ttl > 0, bcrypt cost, body size)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// Minimum secret length outside of development.
const MIN_SECRET_LEN: usize = 16;

/// Supported storage URL schemes.
const STORAGE_SCHEMES: &[&str] = &["memory"];

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("auth.jwt_secret (JWT_SECRET) is required")]
    MissingSecret,

    #[error("auth.jwt_secret must be at least 16 bytes in production")]
    WeakSecret,

    #[error("auth.token_ttl_secs must be greater than zero")]
    ZeroTokenTtl,

    #[error("auth.token_ttl_secs {0} exceeds the largest representable expiry")]
    TokenTtlTooLarge(u64),

    #[error("auth.bcrypt_cost must be between 4 and 31, got {0}")]
    BcryptCost(u32),

    #[error("auth.token_header {0:?} is not a valid header name")]
    TokenHeader(String),

    #[error("storage.url (STORAGE_URL) is required")]
    MissingStorageUrl,

    #[error("storage.url {0:?} is not a supported storage backend")]
    UnsupportedStorage(String),

    #[error("security.max_body_size must be greater than zero")]
    ZeroBodySize,

    #[error("rate_limit.window_secs and rate_limit.max_attempts must be greater than zero")]
    RateLimitRange,

    #[error("generation.timeout_secs must be greater than zero")]
    ZeroGenerationTimeout,

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("{field} {value:?} is not a valid socket address")]
    Address { field: &'static str, value: String },
}

/// Validate a loaded configuration, collecting every problem.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let secret = config.auth.jwt_secret.trim();
    if secret.is_empty() {
        errors.push(ValidationError::MissingSecret);
    } else if config.security.is_production() && secret.len() < MIN_SECRET_LEN {
        errors.push(ValidationError::WeakSecret);
    }

    if config.auth.token_ttl_secs == 0 {
        errors.push(ValidationError::ZeroTokenTtl);
    } else if i64::try_from(config.auth.token_ttl_secs).is_err() {
        errors.push(ValidationError::TokenTtlTooLarge(config.auth.token_ttl_secs));
    }

    if !(4..=31).contains(&config.auth.bcrypt_cost) {
        errors.push(ValidationError::BcryptCost(config.auth.bcrypt_cost));
    }

    if axum::http::HeaderName::try_from(config.auth.token_header.as_str()).is_err() {
        errors.push(ValidationError::TokenHeader(config.auth.token_header.clone()));
    }

    let storage = config.storage.url.trim();
    if storage.is_empty() {
        errors.push(ValidationError::MissingStorageUrl);
    } else {
        let supported = url::Url::parse(storage)
            .map(|u| STORAGE_SCHEMES.contains(&u.scheme()))
            .unwrap_or(false);
        if !supported {
            errors.push(ValidationError::UnsupportedStorage(storage.to_string()));
        }
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodySize);
    }

    if config.rate_limit.window_secs == 0 || config.rate_limit.max_attempts == 0 {
        errors.push(ValidationError::RateLimitRange);
    }

    if config.generation.timeout_secs == 0 {
        errors.push(ValidationError::ZeroGenerationTimeout);
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::Address {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
