//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the stores, services and gate from configuration
//! - Create the Axum router with all handlers
//! - Wire up middleware (tracing, request ID, limits, sanitization,
//!   security headers, CORS, metrics)
//! - Serve on a listener until shutdown is triggered

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware, Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::accounts::AccountService;
use crate::auth::{AuthGate, BcryptHasher, TokenCodec, TokenError};
use crate::config::AppConfig;
use crate::generation::{ContentGenerator, GenerationService, HttpContentGenerator};
use crate::http::request::{make_request_span, sanitize_request, SanitizeState};
use crate::http::routes::api_router;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::posts::PostService;
use crate::security::{
    headers, limits, DenylistSanitizer, InMemoryAttemptStore, RateLimiter, Sanitizer,
};
use crate::store::MemoryStore;
use crate::SharedClock;

/// Failures while assembling the application from a validated config.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("token codec: {0}")]
    Token(#[from] TokenError),

    #[error("invalid token header name: {0}")]
    TokenHeader(String),

    #[error("pattern compile: {0}")]
    Pattern(#[from] regex::Error),

    #[error("generator client: {0}")]
    Generator(#[from] reqwest::Error),

    #[error("unsupported storage url: {0}")]
    Storage(String),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub posts: Arc<PostService>,
    pub generation: Arc<GenerationService>,
    pub gate: Arc<AuthGate>,
    pub sanitizer: Arc<dyn Sanitizer>,
    pub auth_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wire every collaborator for `config`, reading time from `clock`.
    pub fn from_config(config: &AppConfig, clock: SharedClock) -> Result<Self, StartupError> {
        let store = open_store(&config.storage.url)?;

        let codec = Arc::new(TokenCodec::new(
            &config.auth.jwt_secret,
            config.auth.token_ttl(),
            clock.clone(),
        )?);
        let header_name = HeaderName::from_bytes(config.auth.token_header.as_bytes())
            .map_err(|_| StartupError::TokenHeader(config.auth.token_header.clone()))?;
        let gate = Arc::new(AuthGate::new(header_name, codec.clone()));

        let max_attempts = if config.rate_limit.enabled {
            config.rate_limit.max_attempts
        } else {
            tracing::warn!("Credential attempt limiting disabled");
            usize::MAX
        };
        let auth_limiter = Arc::new(RateLimiter::new(
            Arc::new(InMemoryAttemptStore::new()),
            config.rate_limit.window(),
            max_attempts,
            clock.clone(),
        ));

        let accounts = Arc::new(AccountService::new(
            Arc::new(store.clone()),
            Arc::new(BcryptHasher::new(config.auth.bcrypt_cost)),
            codec,
            auth_limiter.clone(),
            clock.clone(),
        )?);

        let sanitizer: Arc<dyn Sanitizer> = Arc::new(DenylistSanitizer::new()?);
        let posts = Arc::new(PostService::new(
            Arc::new(store.clone()),
            Arc::new(store),
            sanitizer.clone(),
            clock.clone(),
        ));

        let generator: Option<Arc<dyn ContentGenerator>> = if config.generation.is_configured() {
            Some(Arc::new(HttpContentGenerator::new(
                config.generation.endpoint.clone(),
                config.generation.api_key.clone(),
                config.generation.timeout(),
            )?))
        } else {
            None
        };
        let quota = Arc::new(RateLimiter::new(
            Arc::new(InMemoryAttemptStore::new()),
            config.generation.window(),
            config.generation.max_per_window,
            clock,
        ));
        let generation = Arc::new(GenerationService::new(
            generator,
            quota,
            config.generation.timeout(),
        ));

        Ok(Self {
            accounts,
            posts,
            generation,
            gate,
            sanitizer,
            auth_limiter,
        })
    }
}

fn open_store(url: &str) -> Result<MemoryStore, StartupError> {
    match url::Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "memory" => {
            tracing::info!(url = %url, "Using in-memory document store");
            Ok(MemoryStore::new())
        }
        _ => Err(StartupError::Storage(url.to_string())),
    }
}

/// HTTP server for the blog API.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
}

impl HttpServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, state: AppState) -> Router {
        let max_body = config.security.max_body_size;
        let sanitize = SanitizeState {
            sanitizer: state.sanitizer.clone(),
            max_body,
        };

        let router = api_router(state)
            .layer(middleware::from_fn_with_state(sanitize, sanitize_request))
            .layer(DefaultBodyLimit::max(max_body))
            .layer(RequestBodyLimitLayer::new(max_body))
            .layer(middleware::from_fn_with_state(
                limits::BodyLimit(max_body),
                limits::check_content_length,
            ))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(cors_layer(
                &config.security.allowed_origin,
                &config.auth.token_header,
            ));

        headers::apply(router, &config.security)
            .layer(middleware::from_fn(metrics::track_requests))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections until `shutdown` triggers.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = %self.config.security.environment,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// CORS for the configured frontend origin. `token_header` is the gate's
/// header, so preflights for authenticated calls succeed.
fn cors_layer(origin: &str, token_header: &str) -> CorsLayer {
    let mut allowed = vec![header::CONTENT_TYPE, header::AUTHORIZATION];
    match HeaderName::from_bytes(token_header.as_bytes()) {
        Ok(name) => allowed.push(name),
        Err(_) => tracing::warn!(header = %token_header, "Invalid token header, not allowed by CORS"),
    }

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(allowed)
        .allow_credentials(true);

    match HeaderValue::from_str(origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin = %origin, "Invalid CORS origin, cross-origin requests disabled");
            layer
        }
    }
}
