//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;
use std::time::Duration;

use mockable::Env;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply environment
/// overrides and validate the result.
pub fn load_config<E: Env>(path: Option<&Path>, env: &E) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => AppConfig::default(),
    };

    apply_env(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment variables on top of file/default values.
pub fn apply_env<E: Env>(config: &mut AppConfig, env: &E) -> Result<(), ConfigError> {
    if let Some(secret) = env.string("JWT_SECRET") {
        config.auth.jwt_secret = secret;
    }
    if let Some(raw) = env.string("JWT_EXPIRES_IN") {
        let ttl = parse_duration(&raw).ok_or(ConfigError::InvalidEnv {
            name: "JWT_EXPIRES_IN",
            value: raw.clone(),
        })?;
        config.auth.token_ttl_secs = ttl.as_secs();
    }
    if let Some(raw) = env.string("BCRYPT_SALT_ROUNDS") {
        config.auth.bcrypt_cost = parse_number("BCRYPT_SALT_ROUNDS", raw)?;
    }

    if let Some(url) = env.string("STORAGE_URL").or_else(|| env.string("MONGO_URI")) {
        config.storage.url = url;
    }

    if let Some(raw) = env.string("MAX_BODY_SIZE") {
        config.security.max_body_size = parse_number("MAX_BODY_SIZE", raw)?;
    }
    if let Some(origin) = env.string("FRONTEND_URL") {
        config.security.allowed_origin = origin;
    }
    if let Some(mode) = env.string("APP_ENV").or_else(|| env.string("NODE_ENV")) {
        config.security.environment = mode;
    }

    if let Some(addr) = env.string("BIND_ADDRESS") {
        config.listener.bind_address = addr;
    } else if let Some(raw) = env.string("PORT") {
        let port: u16 = parse_number("PORT", raw)?;
        config.listener.bind_address = format!("0.0.0.0:{port}");
    }

    if let Some(endpoint) = env.string("GENERATOR_URL") {
        config.generation.endpoint = endpoint;
    }
    if let Some(key) = env.string("GENERATOR_API_KEY") {
        config.generation.api_key = key;
    }
    if let Some(raw) = env.string("GENERATOR_TIMEOUT_SECS") {
        config.generation.timeout_secs = parse_number("GENERATOR_TIMEOUT_SECS", raw)?;
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name, value: raw })
}

/// Parse a compact duration such as `5h`, `30m`, `45s`, `2d` or a bare
/// number of seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;

    let multiplier = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };

    value.checked_mul(multiplier).map(Duration::from_secs)
}
