//! Request handling and transformation.
//!
//! # Responsibilities
//! - Expose the request id assigned by the request-id layer
//! - Build the per-request tracing span
//! - Escape top-level string fields of query strings and JSON bodies
//! - Decode JSON bodies into the error taxonomy instead of axum's plain
//!   text rejections
//!
//! # Design Decisions
//! - The body is buffered once, up to the body limit, and re-serialized
//!   after sanitization; `Content-Length` is rewritten to match
//! - Non-JSON bodies pass through untouched

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Request, State},
    http::{header, uri::PathAndQuery, HeaderMap, HeaderValue, Uri},
    middleware::Next,
    response::Response,
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Span;

use crate::error::ApiError;
use crate::security::sanitize::{sanitize_fields, Sanitizer};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Request id set by `SetRequestIdLayer`, or `"unknown"`.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Span for one request. `user_id` is filled in by the auth gate.
pub fn make_request_span(request: &Request) -> Span {
    tracing::info_span!(
        "request",
        request_id = %request_id(request.headers()),
        method = %request.method(),
        path = %request.uri().path(),
        user_id = tracing::field::Empty,
    )
}

/// State for [`sanitize_request`].
#[derive(Clone)]
pub struct SanitizeState {
    pub sanitizer: Arc<dyn Sanitizer>,
    pub max_body: usize,
}

/// Escape every top-level string in the query string and JSON body before
/// any handler sees them.
pub async fn sanitize_request(
    State(state): State<SanitizeState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();

    if let Some(query) = parts.uri.query() {
        let sanitized = sanitize_query(state.sanitizer.as_ref(), query);
        parts.uri = replace_query(&parts.uri, &sanitized)?;
    }

    if !is_json(&parts.headers) {
        return Ok(next.run(Request::from_parts(parts, body)).await);
    }

    let bytes = axum::body::to_bytes(body, state.max_body)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, max = state.max_body, "Failed to buffer request body");
            ApiError::PayloadTooLarge
        })?;

    let bytes = if bytes.is_empty() {
        bytes
    } else {
        let mut value: Value = serde_json::from_slice(&bytes)
            .map_err(|_| ApiError::validation("Invalid JSON body"))?;
        if let Value::Object(fields) = &mut value {
            sanitize_fields(state.sanitizer.as_ref(), fields);
        }
        let encoded = serde_json::to_vec(&value).map_err(|e| {
            tracing::error!(error = %e, "Failed to re-encode sanitized body");
            ApiError::Internal("Server error".to_string())
        })?;
        Bytes::from(encoded)
    };

    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

/// Same acceptance rule as axum's `Json`: `application/json` or any
/// `application/*+json`.
fn is_json(headers: &HeaderMap) -> bool {
    let Some(mime) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
    else {
        return false;
    };

    mime.type_() == "application"
        && (mime.subtype() == "json" || mime.suffix().is_some_and(|name| name == "json"))
}

fn sanitize_query(sanitizer: &dyn Sanitizer, query: &str) -> String {
    let mut out = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        out.append_pair(&key, &sanitizer.scalar(&value));
    }
    out.finish()
}

fn replace_query(uri: &Uri, query: &str) -> Result<Uri, ApiError> {
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };

    let mut uri_parts = uri.clone().into_parts();
    uri_parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query)
            .map_err(|_| ApiError::validation("Invalid query string"))?,
    );
    Uri::from_parts(uri_parts).map_err(|_| ApiError::validation("Invalid query string"))
}

/// JSON body extractor whose rejection is an [`ApiError`].
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection.body_text(), "Rejected JSON body");
                Err(ApiError::validation("Invalid request body"))
            }
        }
    }
}
