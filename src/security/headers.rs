//! Security response headers.
//!
//! Every response gets `nosniff`, frame denial and the legacy XSS filter
//! header. Production deployments also get HSTS. Handlers can still set
//! their own values; these are only added when absent.

use axum::http::{header, HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::SecurityConfig;

const X_XSS_PROTECTION: HeaderName = HeaderName::from_static("x-xss-protection");

/// The fixed header set for a configuration.
pub fn security_headers(config: &SecurityConfig) -> Vec<(HeaderName, HeaderValue)> {
    if !config.enable_headers {
        return Vec::new();
    }

    let mut headers = vec![
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
    ];

    if config.is_production() {
        headers.push((
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ));
    }

    headers
}

/// Layer the security headers onto `router`.
pub fn apply<S>(router: Router<S>, config: &SecurityConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    security_headers(config)
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(name, value))
        })
}
