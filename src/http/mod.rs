//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request id, tracing, metrics, headers, limits)
//!     → request.rs (sanitize query and JSON body)
//!     → routes/ (public or behind the auth gate)
//!     → accounts / posts / generation services
//!     → response.rs (ApiError → status + JSON body)
//! ```

pub mod request;
pub mod response;
pub mod routes;
pub mod server;

pub use request::{request_id, ApiJson, X_REQUEST_ID};
pub use server::{AppState, HttpServer, StartupError};
