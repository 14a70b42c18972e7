mod support;

use std::time::Duration;

use futures_util::SinkExt;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

use support::{assert_silent, next_event, TestServer};

async fn exchange_message(server: &TestServer, from_token: &str, to: domain::UserId) {
    let response = server
        .http
        .post(server.url("/messages"))
        .bearer_auth(from_token)
        .json(&json!({"recipientId": to.to_string(), "content": "hi"}))
        .send()
        .await
        .expect("send message");
    assert_eq!(response.status(), 201);
}

#[tokio::test]
async fn contacts_see_online_and_offline_transitions() {
    let server = TestServer::start().await;
    let (_alice, alice_token) = server.seed_user("alice").await;
    let (bob, bob_token) = server.seed_user("bob").await;
    let (_carol, carol_token) = server.seed_user("carol").await;
    exchange_message(&server, &alice_token, bob).await;

    let mut alice_ws = server.connect(&alice_token).await;
    let mut carol_ws = server.connect(&carol_token).await;

    let mut bob_ws = server.connect(&bob_token).await;
    let online = next_event(&mut alice_ws).await;
    assert_eq!(online["event"], "user-online");
    assert_eq!(online["data"]["userId"], bob.to_string());

    // 第二个连接不会再次广播上线
    let mut bob_second = server.connect(&bob_token).await;
    assert_silent(&mut alice_ws, Duration::from_millis(200)).await;

    bob_second
        .send(TungsteniteMessage::Close(None))
        .await
        .expect("close second");
    assert_silent(&mut alice_ws, Duration::from_millis(200)).await;

    bob_ws
        .send(TungsteniteMessage::Close(None))
        .await
        .expect("close first");
    let offline = next_event(&mut alice_ws).await;
    assert_eq!(offline["event"], "user-offline");
    assert_eq!(offline["data"]["userId"], bob.to_string());
    assert!(offline["data"]["lastSeen"].is_string());

    // 没有会话往来的用户收不到任何通知
    assert_silent(&mut carol_ws, Duration::from_millis(100)).await;

    let profile: Value = server
        .http
        .get(server.url(&format!("/users/{bob}")))
        .bearer_auth(&alice_token)
        .send()
        .await
        .expect("profile")
        .json()
        .await
        .expect("profile json");
    assert_eq!(profile["status"], "offline");
    assert!(profile["lastSeen"].is_string());
}
