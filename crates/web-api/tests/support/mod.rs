#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use application::{
    ConversationService, DispatcherDependencies, EventDispatcher, MemoryMessageRepository,
    MemoryUserRepository, PresenceRegistry, SystemClock, UserDirectory, UserRepository,
};
use domain::{User, UserId, Username};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState, JwtConfig, JwtIdentityResolver, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const TEST_SECRET: &str = "test-secret-key-with-at-least-32-characters";

/// 基于内存存储的测试服务器
pub struct TestServer {
    pub base_http: String,
    pub base_ws: String,
    pub jwt: Arc<JwtService>,
    pub users: Arc<MemoryUserRepository>,
    pub http: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_typing_timeout(Duration::from_secs(3)).await
    }

    pub async fn start_with_typing_timeout(typing_timeout: Duration) -> Self {
        let messages = Arc::new(MemoryMessageRepository::new());
        let users = Arc::new(MemoryUserRepository::new());
        let jwt = Arc::new(JwtService::new(JwtConfig {
            secret: TEST_SECRET.to_string(),
            expiration_hours: 1,
        }));

        let dispatcher = Arc::new(EventDispatcher::new(DispatcherDependencies {
            message_repository: messages.clone(),
            user_repository: users.clone(),
            presence: Arc::new(PresenceRegistry::new()),
            clock: Arc::new(SystemClock),
            typing_timeout,
        }));
        let state = AppState::new(
            dispatcher,
            Arc::new(ConversationService::new(messages, users.clone())),
            Arc::new(UserDirectory::new(users.clone())),
            Arc::new(JwtIdentityResolver::new(jwt.clone(), users.clone())),
            64,
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(state);

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            base_http: format!("http://{addr}"),
            base_ws: format!("ws://{addr}"),
            jwt,
            users,
            http: reqwest::Client::new(),
            shutdown: Some(shutdown_tx),
        }
    }

    /// 创建用户并签发 token
    pub async fn seed_user(&self, name: &str) -> (UserId, String) {
        let user = User::new(
            UserId::generate(),
            Username::parse(name).expect("username"),
            time::OffsetDateTime::now_utc(),
        );
        let user = self.users.create(user).await.expect("seed user");
        let token = self.jwt.generate_token(user.id).expect("token");
        (user.id, token)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_http)
    }

    /// 建立连接，并通过一次 user-status 往返确认连接已登记
    pub async fn connect(&self, token: &str) -> WsClient {
        let (mut ws, _) = connect_async(format!("{}/api/v1/ws?token={token}", self.base_ws))
            .await
            .expect("websocket connect");
        send_event(&mut ws, json!({"event": "user-status", "data": {}})).await;
        let reply = next_event(&mut ws).await;
        assert_eq!(reply["event"], "user-status");
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn send_event(ws: &mut WsClient, event: Value) {
    ws.send(TungsteniteMessage::Text(event.to_string().into()))
        .await
        .expect("send frame");
}

/// 读取下一个 JSON 事件，跳过控制帧
pub async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("frame error");
        if let TungsteniteMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("json frame");
        }
    }
}

/// 在给定时间内没有任何事件到达
pub async fn assert_silent(ws: &mut WsClient, window: Duration) {
    if let Ok(Some(Ok(TungsteniteMessage::Text(text)))) = timeout(window, ws.next()).await {
        panic!("unexpected event: {text}");
    }
}
