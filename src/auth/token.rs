//! Identity token codec.
//!
//! Tokens are HS256 JWTs carrying `{sub, iat, exp, jti}`. Expiry is checked
//! against the injected clock rather than by `jsonwebtoken` itself, so the
//! boundary is exact: a token is valid strictly before `exp` and invalid at
//! or after it.

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::UserId;
use crate::SharedClock;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expires at (unix seconds).
    pub exp: i64,
    /// Token id, the handle a revocation list would key on.
    pub jti: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("signing secret is empty")]
    MissingSecret,

    #[error("token lifetime must be positive")]
    InvalidTtl,

    #[error("token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),

    #[error("token expired at {exp}")]
    Expired { exp: i64 },

    #[error("token subject is not a user id")]
    Subject,
}

/// A freshly signed token with its decoded claims.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// The subject and token id recovered from a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: UserId,
    pub token_id: String,
}

/// Signs and verifies identity tokens with a process-wide secret.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    default_ttl: Duration,
    clock: SharedClock,
}

impl TokenCodec {
    /// Build a codec. An empty secret is a startup error.
    pub fn new(secret: &str, default_ttl: Duration, clock: SharedClock) -> Result<Self, TokenError> {
        if secret.trim().is_empty() {
            return Err(TokenError::MissingSecret);
        }
        if default_ttl.is_zero() || i64::try_from(default_ttl.as_secs()).is_err() {
            return Err(TokenError::InvalidTtl);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            default_ttl,
            clock,
        })
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a token for `subject` with the configured lifetime.
    pub fn issue(&self, subject: &UserId) -> Result<IssuedToken, TokenError> {
        self.issue_with_ttl(subject, self.default_ttl)
    }

    pub fn issue_with_ttl(&self, subject: &UserId, ttl: Duration) -> Result<IssuedToken, TokenError> {
        let ttl_secs = i64::try_from(ttl.as_secs()).map_err(|_| TokenError::InvalidTtl)?;
        if ttl_secs == 0 {
            return Err(TokenError::InvalidTtl);
        }

        let iat = self.clock.utc().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iat,
            exp: iat.saturating_add(ttl_secs),
            jti: Uuid::new_v4().to_string(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(IssuedToken { token, claims })
    }

    /// Verify signature, shape and expiry. All-or-nothing.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)?;
        let claims = data.claims;

        if self.clock.utc().timestamp() >= claims.exp {
            return Err(TokenError::Expired { exp: claims.exp });
        }

        let subject = claims.sub.parse().map_err(|_| TokenError::Subject)?;
        Ok(VerifiedToken {
            subject,
            token_id: claims.jti,
        })
    }
}
