//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env file (dotenvy, optional)
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, then environment overrides)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the signing secret and token TTL are
//!   never mutated after startup
//! - All fields have defaults except the ones that must come from the
//!   operator (signing secret, storage URL)
//! - Validation separates syntactic (serde) from semantic checks
//! - Any validation failure is fatal at startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_duration, ConfigError};
pub use schema::{
    AppConfig, AuthConfig, GenerationConfig, ListenerConfig, ObservabilityConfig,
    RateLimitConfig, SecurityConfig, StorageConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
