//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (declared Content-Length against the body limit)
//!     → sanitize.rs (escape top-level string fields of query and body)
//!     → handler
//!         → rate_limit.rs (register/login attempts, generation quota)
//! Outgoing response:
//!     → headers.rs (nosniff, frame denial, HSTS in production)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input
//! - Attempt accounting is linearizable per key

pub mod headers;
pub mod limits;
pub mod rate_limit;
pub mod sanitize;

pub use rate_limit::{AttemptLog, AttemptStore, InMemoryAttemptStore, RateKey, RateLimiter};
pub use sanitize::{sanitize_scalar, DenylistSanitizer, Sanitizer};
