//! Request-level error taxonomy.
//!
//! Every rejected request ends up as one of these variants. Client-fault
//! variants carry a specific message; server-fault variants carry a generic
//! one and the internal detail goes to the log where the error was created.
//! The HTTP mapping lives in `http::response`.

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// No token header on a protected route.
    #[error("No token, authorization denied")]
    NoCredential,

    /// Bad signature, malformed payload or expired token.
    #[error("Token is not valid")]
    InvalidCredential,

    /// Attempt budget exhausted; recoverable after `retry_after_minutes`.
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after_minutes: u64,
    },

    #[error("{0}")]
    ValidationFailed(String),

    /// Authenticated, but not the owner of the resource.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Uniqueness violation.
    #[error("{0}")]
    Conflict(String),

    /// Storage or content generation failure; safe to retry later.
    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("Request entity too large")]
    PayloadTooLarge,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }

    /// Translate a storage failure, logging the internal detail.
    ///
    /// `context` names the operation and becomes part of the generic message.
    pub fn from_store(err: StoreError, context: &'static str) -> Self {
        match err {
            StoreError::DuplicateKey(key) => {
                tracing::warn!(key = %key, context, "Duplicate key on write");
                Self::Conflict("Resource already exists".to_string())
            }
            StoreError::NotFound => Self::NotFound("Resource not found".to_string()),
            StoreError::Unavailable(detail) => {
                tracing::error!(error = %detail, context, "Storage unavailable");
                Self::UpstreamUnavailable(format!("Server error while {context}"))
            }
        }
    }

    /// Short machine-friendly label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoCredential => "no_credential",
            Self::InvalidCredential => "invalid_credential",
            Self::RateLimited { .. } => "rate_limited",
            Self::ValidationFailed(_) => "validation_failed",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::PayloadTooLarge => "payload_too_large",
            Self::Internal(_) => "internal",
        }
    }
}
