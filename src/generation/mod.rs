//! Content generation subsystem.
//!
//! # Data Flow
//! ```text
//! POST /api/posts/generate
//!     → GenerationService::generate
//!         → validate topic / tone / length
//!         → per-user quota (RateLimiter, action "generate")
//!         → ContentGenerator::generate, bounded by a timeout
//!     → {title, content}
//! ```
//!
//! # Design Decisions
//! - The generator is an opaque collaborator behind [`ContentGenerator`];
//!   `http.rs` holds the shipped JSON-over-HTTP client
//! - A quota slot is taken when the call is admitted and handed back if the
//!   generator fails or times out, so only successful generations count
//! - Without a configured endpoint every call reports the service as
//!   unavailable

pub mod http;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::observability::metrics;
use crate::security::RateLimiter;
use crate::store::UserId;

pub use self::http::HttpContentGenerator;

pub const TOPIC_MIN: usize = 5;
pub const TOPIC_MAX: usize = 200;

/// Quota action name for generation requests.
const ACTION: &str = "generate";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Casual,
    #[default]
    Professional,
    Academic,
}

impl FromStr for Tone {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "casual" => Ok(Self::Casual),
            "professional" => Ok(Self::Professional),
            "academic" => Ok(Self::Academic),
            _ => Err(ApiError::validation(
                "Invalid tone. Must be one of: casual, professional, academic",
            )),
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Casual => "casual",
            Self::Professional => "professional",
            Self::Academic => "academic",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Length {
    Short,
    #[default]
    Medium,
    Long,
}

impl FromStr for Length {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "long" => Ok(Self::Long),
            _ => Err(ApiError::validation(
                "Invalid length. Must be one of: short, medium, long",
            )),
        }
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GenerationOptions {
    pub tone: Tone,
    pub length: Length,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GeneratedContent {
    pub title: String,
    pub content: String,
}

/// Failures reported by a generator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("generator rate limit: {0}")]
    RateLimited(String),

    #[error("generator unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("network error: {0}")]
    NetworkError(String),
}

impl GenerationError {
    fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "rate_limited",
            Self::ServiceUnavailable(_) => "unavailable",
            Self::NetworkError(_) => "network",
        }
    }
}

/// External content generator.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        topic: &str,
        options: GenerationOptions,
    ) -> Result<GeneratedContent, GenerationError>;
}

/// Body of a generation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub length: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub title: String,
    pub content: String,
    pub topic: String,
    pub options: GenerationOptions,
}

pub struct GenerationService {
    generator: Option<Arc<dyn ContentGenerator>>,
    quota: Arc<RateLimiter>,
    timeout: Duration,
}

impl GenerationService {
    pub fn new(
        generator: Option<Arc<dyn ContentGenerator>>,
        quota: Arc<RateLimiter>,
        timeout: Duration,
    ) -> Self {
        if generator.is_none() {
            tracing::warn!("No content generator configured; generation requests will fail");
        }
        Self {
            generator,
            quota,
            timeout,
        }
    }

    pub async fn generate(
        &self,
        user: &UserId,
        request: GenerateRequest,
    ) -> Result<GenerateResponse, ApiError> {
        let (topic, options) = validate(request)?;

        let client = user.to_string();
        let Some(slot) = self.quota.acquire(&client, ACTION).await else {
            return Err(ApiError::RateLimited {
                message: format!(
                    "Rate limit exceeded. You can generate up to {} blog posts per hour.",
                    self.quota.max_attempts()
                ),
                retry_after_minutes: self.quota.retry_after_minutes(),
            });
        };

        let result = self.call_generator(user, &topic, options).await;
        if result.is_err() {
            self.quota.refund(&client, ACTION, slot).await;
        }
        let generated = result?;

        tracing::info!(user_id = %user, topic = %topic, "Content generated");
        Ok(GenerateResponse {
            success: true,
            title: generated.title,
            content: generated.content,
            topic,
            options,
        })
    }

    async fn call_generator(
        &self,
        user: &UserId,
        topic: &str,
        options: GenerationOptions,
    ) -> Result<GeneratedContent, ApiError> {
        let Some(generator) = &self.generator else {
            return Err(unavailable());
        };

        let outcome = tokio::time::timeout(self.timeout, generator.generate(topic, options)).await;
        match outcome {
            Ok(Ok(generated)) => Ok(generated),
            Ok(Err(e)) => {
                tracing::error!(user_id = %user, error = %e, "Content generation failed");
                metrics::record_generation_failure(e.kind());
                Err(match e {
                    GenerationError::RateLimited(_) => ApiError::RateLimited {
                        message: "AI service rate limit reached. Please try again later."
                            .to_string(),
                        retry_after_minutes: 1,
                    },
                    GenerationError::ServiceUnavailable(_) => unavailable(),
                    GenerationError::NetworkError(_) => ApiError::UpstreamUnavailable(
                        "Network connection error. Please check your connection and try again."
                            .to_string(),
                    ),
                })
            }
            Err(_) => {
                tracing::error!(user_id = %user, timeout = ?self.timeout, "Content generation timed out");
                metrics::record_generation_failure("timeout");
                Err(unavailable())
            }
        }
    }
}

fn unavailable() -> ApiError {
    ApiError::UpstreamUnavailable(
        "AI service is currently unavailable. Please try again later.".to_string(),
    )
}

fn validate(request: GenerateRequest) -> Result<(String, GenerationOptions), ApiError> {
    let topic = request
        .topic
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::validation("Topic is required and must be a string"))?;
    let len = topic.chars().count();
    if !(TOPIC_MIN..=TOPIC_MAX).contains(&len) {
        return Err(ApiError::validation(
            "Topic must be between 5 and 200 characters",
        ));
    }

    let tone = match request.tone.as_deref().filter(|t| !t.is_empty()) {
        Some(tone) => tone.parse()?,
        None => Tone::default(),
    };
    let length = match request.length.as_deref().filter(|l| !l.is_empty()) {
        Some(length) => length.parse()?,
        None => Length::default(),
    };

    Ok((topic.to_string(), GenerationOptions { tone, length }))
}
