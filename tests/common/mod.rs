//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::post, Json, Router};
use blog_api::{AppConfig, AppState, HttpServer, Shutdown};
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const TEST_SECRET: &str = "integration-test-secret";

/// A running server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn register(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/users/register"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap()
    }

    pub async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/users/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap()
    }

    /// Register `username` and return its token.
    pub async fn token_for(&self, username: &str) -> String {
        let response = self.register(username, "secret1").await;
        assert_eq!(response.status(), 200, "register {username}");
        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn create_post(&self, token: &str, title: &str, content: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/posts"))
            .header("x-auth-token", token)
            .json(&json!({ "title": title, "content": content }))
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Defaults suitable for tests: cheap hashing, in-memory storage.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = TEST_SECRET.to_string();
    config.auth.bcrypt_cost = 4;
    config.storage.url = "memory://".to_string();
    config
}

pub async fn spawn_server(config: AppConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let state = AppState::from_config(&config, Arc::new(mockable::DefaultClock)).unwrap();
    let server = HttpServer::new(config, state);
    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, signal).await.unwrap();
    });

    TestServer {
        addr,
        client: reqwest::Client::new(),
        shutdown,
    }
}

/// Start a generator endpoint that answers every request with `status`
/// and, on 200, a title and content derived from the request.
pub async fn start_generator(status: u16) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new().route(
        "/generate",
        post(move |Json(body): Json<Value>| async move {
            let status = axum::http::StatusCode::from_u16(status).unwrap();
            let payload = json!({
                "title": format!("About {}", body["topic"].as_str().unwrap_or_default()),
                "content": format!("{} / {}", body["tone"], body["length"]),
            });
            (status, Json(payload))
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/generate")
}
