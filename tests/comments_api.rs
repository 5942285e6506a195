//! End-to-end tests for the comment REST API
//!
//! The full application router is served through `axum_test::TestServer`
//! with the in-memory store and broker.

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use threadline::config::{AppConfig, TokenConfig};
use threadline::core::store::KeyValueStore;
use threadline::server::ServerBuilder;
use threadline::storage::InMemoryStore;

const ALICE_TOKEN: &str = "alice-token";
const BOB_TOKEN: &str = "bob-token";

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.tokens = vec![
        TokenConfig {
            token: ALICE_TOKEN.to_string(),
            user_id: "u-alice".to_string(),
            username: "alice".to_string(),
        },
        TokenConfig {
            token: BOB_TOKEN.to_string(),
            user_id: "u-bob".to_string(),
            username: "bob".to_string(),
        },
    ];
    config
}

fn create_test_server() -> (TestServer, InMemoryStore) {
    let store = InMemoryStore::new();
    let app = ServerBuilder::new()
        .with_config(test_config())
        .with_store(store.clone())
        .build()
        .expect("Failed to build app");

    let server = TestServer::new(app).expect("Failed to create test server");
    (server, store)
}

async fn post_comment(server: &TestServer, token: &str, thread: &str, content: &str) -> Value {
    let response = server
        .post(&format!("/threads/{}/comments", thread))
        .authorization_bearer(token)
        .json(&json!({ "content": content }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

// =============================================================================
// Health Check Tests
// =============================================================================

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (server, _) = create_test_server();

        let response = server.get("/health").await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "threadline");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["subscriptions"], 0);
    }

    #[tokio::test]
    async fn test_healthz_endpoint() {
        let (server, _) = create_test_server();

        let response = server.get("/healthz").await;
        response.assert_status_ok();
    }
}

// =============================================================================
// Create
// =============================================================================

mod create_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_comment() {
        let (server, _) = create_test_server();

        let body = post_comment(&server, ALICE_TOKEN, "t1", "hello").await;

        assert_eq!(body["thread_id"], "t1");
        assert_eq!(body["author"], "alice");
        assert_eq!(body["content"], "hello");
        assert!(body["comment_id"].as_str().is_some());
        assert!(body["timestamp"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_author_comes_from_token() {
        let (server, _) = create_test_server();

        let response = server
            .post("/threads/t1/comments")
            .authorization_bearer(BOB_TOKEN)
            .json(&json!({ "content": "hi", "author": "mallory" }))
            .await;
        response.assert_status(StatusCode::CREATED);

        let body: Value = response.json();
        assert_eq!(body["author"], "bob");
    }

    #[tokio::test]
    async fn test_create_without_token_is_unauthorized() {
        let (server, store) = create_test_server();

        let response = server
            .post("/threads/t1/comments")
            .json(&json!({ "content": "hello" }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        let body: Value = response.json();
        assert_eq!(body["code"], "MISSING_CREDENTIALS");
        assert!(store.list_range("thread:t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_with_unknown_token_is_unauthorized() {
        let (server, _) = create_test_server();

        let response = server
            .post("/threads/t1/comments")
            .authorization_bearer("nope")
            .json(&json!({ "content": "hello" }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        let body: Value = response.json();
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_blank_content_is_rejected() {
        let (server, store) = create_test_server();

        let response = server
            .post("/threads/t1/comments")
            .authorization_bearer(ALICE_TOKEN)
            .json(&json!({ "content": "   " }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let body: Value = response.json();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["details"]["fields"]["content"].is_array());
        assert!(store.list_range("thread:t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_content_is_rejected() {
        let (server, _) = create_test_server();

        let response = server
            .post("/threads/t1/comments")
            .authorization_bearer(ALICE_TOKEN)
            .json(&json!({ "content": "x".repeat(4001) }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_thread_id_is_rejected() {
        let (server, _) = create_test_server();

        let response = server
            .post("/threads/bad%20id/comments")
            .authorization_bearer(ALICE_TOKEN)
            .json(&json!({ "content": "hello" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let body: Value = response.json();
        assert_eq!(body["code"], "INVALID_THREAD_ID");
    }
}

// =============================================================================
// List
// =============================================================================

mod list_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_empty_thread() {
        let (server, _) = create_test_server();

        let response = server
            .get("/threads/empty/comments")
            .authorization_bearer(ALICE_TOKEN)
            .await;
        response.assert_status_ok();

        let body: Vec<Value> = response.json();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_list_is_oldest_first() {
        let (server, _) = create_test_server();

        post_comment(&server, ALICE_TOKEN, "t1", "first").await;
        post_comment(&server, BOB_TOKEN, "t1", "second").await;
        post_comment(&server, ALICE_TOKEN, "t1", "third").await;
        post_comment(&server, ALICE_TOKEN, "other", "elsewhere").await;

        let response = server
            .get("/threads/t1/comments")
            .authorization_bearer(BOB_TOKEN)
            .await;
        response.assert_status_ok();

        let body: Vec<Value> = response.json();
        let contents: Vec<&str> = body
            .iter()
            .map(|c| c["content"].as_str().unwrap())
            .collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_list_requires_token() {
        let (server, _) = create_test_server();

        let response = server.get("/threads/t1/comments").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }
}

// =============================================================================
// Delete
// =============================================================================

mod delete_tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_removes_comment() {
        let (server, _) = create_test_server();

        let first = post_comment(&server, ALICE_TOKEN, "t1", "keep").await;
        let second = post_comment(&server, ALICE_TOKEN, "t1", "drop").await;

        let response = server
            .delete(&format!(
                "/threads/t1/comments/{}",
                second["comment_id"].as_str().unwrap()
            ))
            .authorization_bearer(BOB_TOKEN)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");

        let listed: Vec<Value> = server
            .get("/threads/t1/comments")
            .authorization_bearer(ALICE_TOKEN)
            .await
            .json();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["comment_id"], first["comment_id"]);
    }

    #[tokio::test]
    async fn test_delete_under_wrong_thread_keeps_comment() {
        let (server, _) = create_test_server();

        let comment = post_comment(&server, ALICE_TOKEN, "y", "mine").await;

        let response = server
            .delete(&format!(
                "/threads/x/comments/{}",
                comment["comment_id"].as_str().unwrap()
            ))
            .authorization_bearer(BOB_TOKEN)
            .await;
        response.assert_status_ok();

        let listed: Vec<Value> = server
            .get("/threads/y/comments")
            .authorization_bearer(ALICE_TOKEN)
            .await
            .json();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["comment_id"], comment["comment_id"]);
    }

    #[tokio::test]
    async fn test_delete_missing_comment_succeeds() {
        let (server, _) = create_test_server();

        let response = server
            .delete(&format!("/threads/t1/comments/{}", uuid::Uuid::new_v4()))
            .authorization_bearer(ALICE_TOKEN)
            .await;
        response.assert_status_ok();
    }

    #[tokio::test]
    async fn test_delete_malformed_comment_id() {
        let (server, _) = create_test_server();

        let response = server
            .delete("/threads/t1/comments/not-a-uuid")
            .authorization_bearer(ALICE_TOKEN)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let body: Value = response.json();
        assert_eq!(body["code"], "INVALID_COMMENT_ID");
    }

    #[tokio::test]
    async fn test_delete_requires_token() {
        let (server, _) = create_test_server();

        let response = server
            .delete(&format!("/threads/t1/comments/{}", uuid::Uuid::new_v4()))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }
}
