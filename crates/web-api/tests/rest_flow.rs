mod support;

use reqwest::StatusCode;
use serde_json::{json, Value};

use support::TestServer;

async fn post_message(
    server: &TestServer,
    token: &str,
    to: &str,
    content: &str,
) -> (StatusCode, Value) {
    let response = server
        .http
        .post(server.url("/messages"))
        .bearer_auth(token)
        .json(&json!({"recipientId": to, "content": content}))
        .send()
        .await
        .expect("post message");
    let status = response.status();
    (status, response.json().await.expect("json body"))
}

async fn get_json(server: &TestServer, token: &str, path: &str) -> (StatusCode, Value) {
    let response = server
        .http
        .get(server.url(path))
        .bearer_auth(token)
        .send()
        .await
        .expect("get");
    let status = response.status();
    (status, response.json().await.expect("json body"))
}

#[tokio::test]
async fn health_is_public_and_api_requires_credentials() {
    let server = TestServer::start().await;

    let health = server
        .http
        .get(format!("{}/health", server.base_http))
        .send()
        .await
        .expect("health");
    assert_eq!(health.status(), StatusCode::OK);

    let response = server
        .http
        .get(server.url("/conversations"))
        .send()
        .await
        .expect("conversations");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.expect("error body");
    assert_eq!(body["code"], "UNAUTHORIZED");

    let response = server
        .http
        .get(server.url("/conversations"))
        .bearer_auth("garbage")
        .send()
        .await
        .expect("conversations");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn offline_message_shows_as_unread_until_history_is_opened() {
    let server = TestServer::start().await;
    let (alice, alice_token) = server.seed_user("alice").await;
    let (bob, bob_token) = server.seed_user("bob").await;

    let (status, message) =
        post_message(&server, &alice_token, &bob.to_string(), "  see you soon ").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["content"], "see you soon");
    assert_eq!(message["status"], "sent");
    assert_eq!(message["edited"], false);

    let (_, conversations) = get_json(&server, &bob_token, "/conversations").await;
    let conversations = conversations.as_array().expect("array");
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["peer"]["id"], alice.to_string());
    assert_eq!(conversations[0]["peer"]["username"], "alice");
    assert_eq!(conversations[0]["lastMessage"]["id"], message["id"]);
    assert_eq!(conversations[0]["unreadCount"], 1);

    // 发送方视角没有未读
    let (_, conversations) = get_json(&server, &alice_token, "/conversations").await;
    assert_eq!(conversations[0]["unreadCount"], 0);

    let (status, history) = get_json(&server, &bob_token, &format!("/messages/{alice}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["total"], 1);
    assert_eq!(history["page"], 1);
    assert_eq!(history["data"][0]["id"], message["id"]);

    let (_, conversations) = get_json(&server, &bob_token, "/conversations").await;
    assert_eq!(conversations[0]["unreadCount"], 0);
    assert_eq!(conversations[0]["lastMessage"]["status"], "read");
}

#[tokio::test]
async fn conversations_are_ordered_by_latest_activity() {
    let server = TestServer::start().await;
    let (me, my_token) = server.seed_user("alice").await;
    let (bob, bob_token) = server.seed_user("bob").await;
    let (carol, _) = server.seed_user("carol").await;

    post_message(&server, &bob_token, &me.to_string(), "first").await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    post_message(&server, &my_token, &carol.to_string(), "second").await;

    let (_, conversations) = get_json(&server, &my_token, "/conversations").await;
    assert_eq!(conversations[0]["peer"]["id"], carol.to_string());
    assert_eq!(conversations[1]["peer"]["id"], bob.to_string());
    assert_eq!(conversations[1]["unreadCount"], 1);
}

#[tokio::test]
async fn invalid_sends_are_rejected() {
    let server = TestServer::start().await;
    let (alice, alice_token) = server.seed_user("alice").await;
    let (bob, _) = server.seed_user("bob").await;

    let (status, body) = post_message(&server, &alice_token, &alice.to_string(), "hi").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PAYLOAD");

    let (status, body) = post_message(&server, &alice_token, "nope", "hi").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PAYLOAD");

    let unknown = domain::UserId::generate().to_string();
    let (status, body) = post_message(&server, &alice_token, &unknown, "hi").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "RECIPIENT_NOT_FOUND");

    let bob = bob.to_string();
    let (status, _) = post_message(&server, &alice_token, &bob, &"x".repeat(5000)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = post_message(&server, &alice_token, &bob, &"x".repeat(5001)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PAYLOAD");
}

#[tokio::test]
async fn malformed_requests_get_structured_errors() {
    let server = TestServer::start().await;
    let (_alice, alice_token) = server.seed_user("alice").await;
    let (bob, _) = server.seed_user("bob").await;

    let response = server
        .http
        .post(server.url("/messages"))
        .bearer_auth(&alice_token)
        .header("content-type", "application/json")
        .body("{\"recipientId\": ")
        .send()
        .await
        .expect("post message");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("error body");
    assert_eq!(body["code"], "INVALID_PAYLOAD");
    assert_eq!(body["message"], "invalid request body");

    // 缺少字段
    let response = server
        .http
        .post(server.url("/messages"))
        .bearer_auth(&alice_token)
        .json(&json!({"content": "hi"}))
        .send()
        .await
        .expect("post message");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = get_json(&server, &alice_token, &format!("/messages/{bob}?page=-1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PAYLOAD");

    let (status, body) = get_json(&server, &alice_token, "/users?limit=many").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PAYLOAD");

    let huge = u64::MAX;
    let (status, body) =
        get_json(&server, &alice_token, &format!("/messages/{bob}?page={huge}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().expect("data").is_empty());
}

#[tokio::test]
async fn message_mutations_follow_ownership_rules() {
    let server = TestServer::start().await;
    let (_alice, alice_token) = server.seed_user("alice").await;
    let (bob, bob_token) = server.seed_user("bob").await;
    let (_, message) = post_message(&server, &alice_token, &bob.to_string(), "draft").await;
    let id = message["id"].as_str().expect("id").to_string();
    let http = &server.http;

    // 发送者不能标记已读
    let response = http
        .post(server.url(&format!("/messages/{id}/read")))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    for _ in 0..2 {
        let response = http
            .post(server.url(&format!("/messages/{id}/read")))
            .bearer_auth(&bob_token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = http
        .put(server.url(&format!("/messages/{id}")))
        .bearer_auth(&bob_token)
        .json(&json!({"content": "hijacked"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let edited: Value = http
        .put(server.url(&format!("/messages/{id}")))
        .bearer_auth(&alice_token)
        .json(&json!({"content": "final"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(edited["content"], "final");
    assert_eq!(edited["edited"], true);

    let response = http
        .delete(server.url(&format!("/messages/{id}")))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    for _ in 0..2 {
        let body: Value = http
            .delete(server.url(&format!("/messages/{id}")))
            .bearer_auth(&alice_token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
    }

    let (_, history) = get_json(&server, &alice_token, &format!("/messages/{bob}")).await;
    assert_eq!(history["total"], 0);
    let (_, conversations) = get_json(&server, &bob_token, "/conversations").await;
    assert!(conversations.as_array().unwrap().is_empty());

    let missing = domain::MessageId::generate();
    let response = http
        .post(server.url(&format!("/messages/{missing}/read")))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn users_can_be_listed_and_searched() {
    let server = TestServer::start().await;
    let (_, token) = server.seed_user("alice").await;
    server.seed_user("bob").await;
    server.seed_user("Bobby").await;
    server.seed_user("carol").await;

    let (status, page) = get_json(&server, &token, "/users?page=1&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["pageSize"], 2);
    assert!(page["data"]
        .as_array()
        .unwrap()
        .iter()
        .all(|user| user["username"] != "alice"));

    let (_, found) = get_json(&server, &token, "/users/search?q=BOB").await;
    assert_eq!(found["total"], 2);

    let (_, empty) = get_json(&server, &token, "/users/search?q=").await;
    assert_eq!(empty["total"], 0);

    let unknown = domain::UserId::generate();
    let (status, _) = get_json(&server, &token, &format!("/users/{unknown}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
