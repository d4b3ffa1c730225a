//! Blog API library.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (request id, trace, metrics, headers, limits)
//!                         │
//!                         ▼
//!                     http::request (sanitize query + JSON body)
//!                         │
//!             ┌───────────┴────────────┐
//!             ▼                        ▼
//!      public routes             auth::gate (x-auth-token → UserId)
//!             │                        │
//!             ▼                        ▼
//!      accounts (validate → rate limit → uniqueness/password → token)
//!      posts    (validate → per-post lock → ownership → store)
//!      generation (validate → per-user quota → generator with timeout)
//!             │
//!             ▼
//!      store (UserStore / PostStore, in-memory)
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod store;

// Domain services
pub mod accounts;
pub mod generation;
pub mod posts;

// Cross-cutting concerns
pub mod auth;
pub mod lifecycle;
pub mod observability;
pub mod security;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

pub use config::AppConfig;
pub use error::ApiError;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;

/// Time source shared by every time-dependent component.
pub type SharedClock = Arc<dyn mockable::Clock + Send + Sync>;
