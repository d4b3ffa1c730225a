//! JSON-over-HTTP content generator.
//!
//! Sends `{topic, tone, length}` with a bearer key and expects
//! `{title, content}` back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use super::{ContentGenerator, GeneratedContent, GenerationError, GenerationOptions, Length, Tone};

#[derive(Serialize)]
struct GeneratePayload<'a> {
    topic: &'a str,
    tone: Tone,
    length: Length,
}

pub struct HttpContentGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpContentGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(
        &self,
        topic: &str,
        options: GenerationOptions,
    ) -> Result<GeneratedContent, GenerationError> {
        let payload = GeneratePayload {
            topic,
            tone: options.tone,
            length: options.length,
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GenerationError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify(status));
        }

        let generated: GeneratedContent = response
            .json()
            .await
            .map_err(|e| GenerationError::ServiceUnavailable(format!("malformed response: {e}")))?;

        if generated.title.trim().is_empty() || generated.content.trim().is_empty() {
            return Err(GenerationError::ServiceUnavailable(
                "empty title or content".to_string(),
            ));
        }
        Ok(generated)
    }
}

fn classify(status: StatusCode) -> GenerationError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited(status.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GenerationError::ServiceUnavailable(format!("access denied ({status})"))
        }
        s => GenerationError::ServiceUnavailable(format!("upstream status {s}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::post, Json, Router};
    use tokio::net::TcpListener;

    async fn spawn(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/generate")
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS),
            GenerationError::RateLimited(_)
        ));
        for status in [
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
        ] {
            assert!(matches!(
                classify(status),
                GenerationError::ServiceUnavailable(_)
            ));
        }
    }

    #[tokio::test]
    async fn test_sends_payload_and_key() {
        let router = Router::new().route(
            "/generate",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(serde_json::json!({
                    "title": format!("{} / {}", body["tone"], auth),
                    "content": format!("{} {}", body["topic"], body["length"]),
                }))
            }),
        );
        let endpoint = spawn(router).await;
        let generator = HttpContentGenerator::new(endpoint, "k3y", Duration::from_secs(5)).unwrap();

        let generated = generator
            .generate(
                "ownership",
                GenerationOptions {
                    tone: Tone::Casual,
                    length: Length::Long,
                },
            )
            .await
            .unwrap();

        assert_eq!(generated.title, "\"casual\" / Bearer k3y");
        assert_eq!(generated.content, "\"ownership\" \"long\"");
    }

    #[tokio::test]
    async fn test_upstream_429_is_rate_limited() {
        let router = Router::new().route(
            "/generate",
            post(|| async { StatusCode::TOO_MANY_REQUESTS }),
        );
        let endpoint = spawn(router).await;
        let generator = HttpContentGenerator::new(endpoint, "", Duration::from_secs(5)).unwrap();

        let err = generator
            .generate("ownership", GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let generator =
            HttpContentGenerator::new(format!("http://{addr}/generate"), "", Duration::from_secs(2))
                .unwrap();
        let err = generator
            .generate("ownership", GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::NetworkError(_)));
    }
}
