//! Route table.
//!
//! ```text
//! public:    GET  /                      GET  /health
//!            POST /api/users/register    POST /api/users/login
//!            GET  /api/posts             GET  /api/posts/{id}
//! protected: POST /api/posts             POST /api/posts/generate
//!            PUT  /api/posts/{id}        DELETE /api/posts/{id}
//! ```
//!
//! Protected routes sit behind `require_auth`; the rest never consult the
//! gate.

pub mod posts;
pub mod users;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::auth::require_auth;
use crate::http::server::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn root() -> &'static str {
    "API is running..."
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn api_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/users/register", post(users::register))
        .route("/api/users/login", post(users::login))
        .route("/api/posts", get(posts::list_posts))
        .route("/api/posts/{id}", get(posts::get_post));

    let protected = Router::new()
        .route("/api/posts", post(posts::create_post))
        .route("/api/posts/generate", post(posts::generate_post))
        .route(
            "/api/posts/{id}",
            axum::routing::put(posts::update_post).delete(posts::delete_post),
        )
        .route_layer(middleware::from_fn_with_state(
            state.gate.clone(),
            require_auth,
        ));

    public.merge(protected).with_state(state)
}
