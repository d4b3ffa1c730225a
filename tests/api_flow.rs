//! End-to-end request flows against a running server.

use serde_json::{json, Value};

mod common;

use common::{spawn_server, test_config};

#[tokio::test]
async fn test_root_and_health() {
    let server = spawn_server(test_config()).await;

    let response = server.client.get(server.url("/")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "API is running...");

    let body: Value = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_short_username_is_rejected() {
    let server = spawn_server(test_config()).await;

    let response = server.register("ab", "secret1").await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["msg"], "Username must be at least 3 characters long");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let server = spawn_server(test_config()).await;

    let first = server.register("alice", "secret1").await;
    assert_eq!(first.status(), 200);
    let body: Value = first.json().await.unwrap();
    assert_eq!(body["user"]["username"], "alice");
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));

    let second = server.register("Alice", "secret1").await;
    assert_eq!(second.status(), 409);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["msg"], "User already exists");
}

#[tokio::test]
async fn test_login_returns_same_user() {
    let server = spawn_server(test_config()).await;
    let registered: Value = server.register("bob", "hunter22").await.json().await.unwrap();

    let response = server.login("bob", "hunter22").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"], registered["user"]);

    let response = server.login("bob", "wrong-password").await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["msg"], "Invalid credentials");
}

#[tokio::test]
async fn test_only_author_can_delete() {
    let server = spawn_server(test_config()).await;
    let alice = server.token_for("alice").await;
    let bob = server.token_for("bob").await;

    let created = server.create_post(&alice, "Hello", "First post").await;
    assert_eq!(created.status(), 201);
    let post: Value = created.json().await.unwrap();
    assert_eq!(post["author"]["username"], "alice");
    let id = post["id"].as_str().unwrap().to_string();
    let post_url = server.url(&format!("/api/posts/{id}"));

    let response = server
        .client
        .delete(&post_url)
        .header("x-auth-token", &bob)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["msg"], "Access denied: You can only delete your own posts");

    let response = server
        .client
        .put(&post_url)
        .header("x-auth-token", &bob)
        .json(&json!({ "title": "mine now", "content": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = server
        .client
        .delete(&post_url)
        .header("x-auth-token", &alice)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["msg"], "Post deleted successfully");
    assert_eq!(body["deletedPost"]["title"], "Hello");

    let response = server.client.get(&post_url).send().await.unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["msg"], "Post not found");
}

#[tokio::test]
async fn test_author_updates_post() {
    let server = spawn_server(test_config()).await;
    let alice = server.token_for("alice").await;
    let post: Value = server
        .create_post(&alice, "Draft", "body")
        .await
        .json()
        .await
        .unwrap();

    let response = server
        .client
        .put(server.url(&format!("/api/posts/{}", post["id"].as_str().unwrap())))
        .header("x-auth-token", &alice)
        .json(&json!({ "title": "Final", "content": "new body" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["title"], "Final");
    assert_eq!(body["content"], "new body");
}

#[tokio::test]
async fn test_malformed_post_id() {
    let server = spawn_server(test_config()).await;
    let response = server
        .client
        .get(server.url("/api/posts/not-an-id"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["msg"], "Invalid post ID");
}

#[tokio::test]
async fn test_listing_paginates_newest_first() {
    let server = spawn_server(test_config()).await;
    let token = server.token_for("writer").await;
    for i in 0..3 {
        let response = server.create_post(&token, &format!("post {i}"), "body").await;
        assert_eq!(response.status(), 201);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let body: Value = server
        .client
        .get(server.url("/api/posts?page=1&limit=2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["posts"].as_array().unwrap().len(), 2);
    assert_eq!(body["posts"][0]["title"], "post 2");
    assert_eq!(
        body["pagination"],
        json!({
            "currentPage": 1,
            "totalPages": 2,
            "totalPosts": 3,
            "hasNext": true,
            "hasPrev": false
        })
    );

    let response = server
        .client
        .get(server.url("/api/posts?limit=51"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_markup_is_escaped_before_storage() {
    let server = spawn_server(test_config()).await;
    let token = server.token_for("escaper").await;

    let post: Value = server
        .create_post(&token, "<b>Bold</b>", "Hi <script>alert(1)</script>")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(post["title"], "&lt;b&gt;Bold&lt;/b&gt;");
    assert_eq!(
        post["content"],
        "Hi &lt;script&gt;alert(1)&lt;/script&gt;"
    );
}

#[tokio::test]
async fn test_generation_round_trip() {
    let mut config = test_config();
    config.generation.endpoint = common::start_generator(200).await;
    let server = spawn_server(config).await;
    let token = server.token_for("author").await;

    let response = server
        .client
        .post(server.url("/api/posts/generate"))
        .header("x-auth-token", &token)
        .json(&json!({ "topic": "Rust lifetimes", "tone": "casual" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["title"], "About Rust lifetimes");
    assert_eq!(body["options"], json!({ "tone": "casual", "length": "medium" }));
}

#[tokio::test]
async fn test_generation_upstream_failure_is_unavailable() {
    let mut config = test_config();
    config.generation.endpoint = common::start_generator(500).await;
    let server = spawn_server(config).await;
    let token = server.token_for("author").await;

    let response = server
        .client
        .post(server.url("/api/posts/generate"))
        .header("x-auth-token", &token)
        .json(&json!({ "topic": "Rust lifetimes" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn test_json_suffix_media_type_is_escaped() {
    let server = spawn_server(test_config()).await;
    let token = server.token_for("suffixer").await;

    let response = server
        .client
        .post(server.url("/api/posts"))
        .header("x-auth-token", &token)
        .header("content-type", "application/vnd.api+json")
        .body(r#"{"title":"<b>Bold</b>","content":"<img src=x>"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let post: Value = response.json().await.unwrap();
    assert_eq!(post["title"], "&lt;b&gt;Bold&lt;/b&gt;");
    assert_eq!(post["content"], "&lt;img src=x&gt;");
}
