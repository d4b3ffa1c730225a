//! Authentication gate.
//!
//! ```text
//! Unauthenticated ──header missing/empty──▶ Rejected(NoCredential)
//!        │
//!        └──header present──▶ TokenCodec::verify ──err──▶ Rejected(InvalidCredential)
//!                                     │
//!                                     └──ok──▶ Authenticated(UserId)
//! ```
//!
//! The gate trusts the signed claims and never consults the credential
//! store. A [`TokenDenylist`] can be plugged in when revocation is needed;
//! none is installed by default.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, HeaderName, Request},
    middleware::Next,
    response::Response,
};

use crate::auth::token::TokenCodec;
use crate::error::ApiError;
use crate::observability::metrics;
use crate::store::UserId;

/// Identity attached to a request that passed the gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
}

/// Revocation hook consulted after a token verifies.
pub trait TokenDenylist: Send + Sync {
    fn is_revoked(&self, token_id: &str) -> bool;
}

pub struct AuthGate {
    header: HeaderName,
    codec: Arc<TokenCodec>,
    denylist: Option<Arc<dyn TokenDenylist>>,
}

impl AuthGate {
    pub fn new(header: HeaderName, codec: Arc<TokenCodec>) -> Self {
        Self {
            header,
            codec,
            denylist: None,
        }
    }

    pub fn with_denylist(mut self, denylist: Arc<dyn TokenDenylist>) -> Self {
        self.denylist = Some(denylist);
        self
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Resolve the caller's identity from request headers.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, ApiError> {
        let Some(raw) = headers.get(&self.header) else {
            return Err(ApiError::NoCredential);
        };
        if raw.is_empty() {
            return Err(ApiError::NoCredential);
        }

        let token = raw.to_str().map_err(|_| ApiError::InvalidCredential)?;
        let verified = self.codec.verify(token.trim()).map_err(|e| {
            tracing::debug!(error = %e, "Token verification failed");
            ApiError::InvalidCredential
        })?;

        if let Some(denylist) = &self.denylist {
            if denylist.is_revoked(&verified.token_id) {
                tracing::debug!(token_id = %verified.token_id, "Token revoked");
                return Err(ApiError::InvalidCredential);
            }
        }

        Ok(AuthenticatedUser {
            id: verified.subject,
        })
    }
}

/// Middleware guarding protected routes.
pub async fn require_auth(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    match gate.authenticate(request.headers()) {
        Ok(user) => {
            tracing::Span::current().record("user_id", tracing::field::display(&user.id));
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(err) => {
            tracing::warn!(reason = err.kind(), path = %request.uri().path(), "Request rejected by auth gate");
            metrics::record_auth_rejection(err.kind());
            Err(err)
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Only present when the route sits behind `require_auth`.
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(ApiError::NoCredential)
    }
}
