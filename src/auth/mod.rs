//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! register/login:
//!     accounts.rs → password.rs (bcrypt on the blocking pool)
//!                 → token.rs (issue signed token)
//!
//! protected request:
//!     gate.rs (x-auth-token header → token.rs verify → AuthenticatedUser)
//!     → handler
//!     → ownership.rs (author check before update/delete)
//! ```
//!
//! # Design Decisions
//! - Stateless tokens: the gate never round-trips to the credential store
//! - Fail closed: any verification problem rejects the request
//! - Missing and invalid credentials are reported separately

pub mod gate;
pub mod ownership;
pub mod password;
pub mod token;

pub use gate::{require_auth, AuthGate, AuthenticatedUser, TokenDenylist};
pub use ownership::{authorize, ensure_owner, Owned};
pub use password::{BcryptHasher, PasswordError, PasswordHasher};
pub use token::{Claims, IssuedToken, TokenCodec, TokenError, VerifiedToken};
