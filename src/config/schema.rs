//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the blog API.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the blog API.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Token signing and password hashing.
    pub auth: AuthConfig,

    /// Document storage backend.
    pub storage: StorageConfig,

    /// Attempt limiting for the credential endpoints.
    pub rate_limit: RateLimitConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// External content generation service.
    pub generation: GenerationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Response headers, body limits and CORS.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
        }
    }
}

/// Token and credential settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to sign identity tokens. Required.
    pub jwt_secret: String,

    /// Lifetime of an issued token in seconds.
    pub token_ttl_secs: u64,

    /// bcrypt cost factor.
    pub bcrypt_cost: u32,

    /// Header the client sends its token in.
    pub token_header: String,
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: 5 * 60 * 60, // 5 hours
            bcrypt_cost: 10,
            token_header: "x-auth-token".to_string(),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Connection string. Only `memory://` is supported in-process.
    pub url: String,
}

/// Sliding window limits for register/login attempts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable attempt limiting.
    pub enabled: bool,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Attempts admitted per key within one window.
    pub max_attempts: usize,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 15 * 60,
            max_attempts: 5,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Content generation collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Endpoint accepting `{topic, tone, length}`. Empty disables generation.
    pub endpoint: String,

    /// Bearer key sent to the endpoint.
    pub api_key: String,

    /// Upper bound for one generation call in seconds.
    pub timeout_secs: u64,

    /// Generation requests per user per window.
    pub max_per_window: usize,

    /// Quota window in seconds.
    pub window_secs: u64,
}

impl GenerationConfig {
    pub fn is_configured(&self) -> bool {
        !self.endpoint.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
            max_per_window: 5,
            window_secs: 60 * 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security headers.
    pub enable_headers: bool,
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// Origin allowed by CORS.
    pub allowed_origin: String,
    /// Deployment environment name ("development", "production").
    pub environment: String,
}

impl SecurityConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            max_body_size: 10 * 1024 * 1024, // 10MB
            allowed_origin: "http://localhost:5173".to_string(),
            environment: "development".to_string(),
        }
    }
}
