//! Request size limits.
//!
//! A declared `Content-Length` over the limit is rejected before the body is
//! touched. Bodies without a declared length are capped by
//! `RequestBodyLimitLayer` and by the buffered read in the sanitizer.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;

/// Maximum accepted body size, shared with the middleware as state.
#[derive(Clone, Copy, Debug)]
pub struct BodyLimit(pub usize);

pub async fn check_content_length(
    State(BodyLimit(max)): State<BodyLimit>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    if let Some(len) = declared {
        if len > max as u64 {
            tracing::warn!(content_length = len, max, "Request body too large");
            return Err(ApiError::PayloadTooLarge);
        }
    }

    Ok(next.run(request).await)
}
