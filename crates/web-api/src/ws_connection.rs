use application::{Ack, ApplicationError, ClientEvent, ConnectionHandle, ServerEvent};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// WebSocket 连接管理器
///
/// 单个已认证连接的生命周期：
/// - 在在线状态注册表中登记连接
/// - 将发送队列中的事件写出到 socket
/// - 解析客户端事件并交给分发器处理
/// - 断开时注销连接
pub struct WebSocketConnection {
    state: AppState,
    handle: ConnectionHandle,
    outbound: mpsc::Receiver<ServerEvent>,
}

impl WebSocketConnection {
    /// 登记一个新连接
    pub async fn open(state: AppState, user_id: UserId) -> Self {
        let (handle, outbound) = ConnectionHandle::channel(user_id, state.outbound_buffer);
        state.dispatcher.connect(handle.clone()).await;

        tracing::info!(user_id = %user_id, connection_id = %handle.id(), "WebSocket 连接已建立");

        Self {
            state,
            handle,
            outbound,
        }
    }

    /// 运行 WebSocket 连接的主循环，直到任意一方结束
    pub async fn run(self, socket: WebSocket) {
        let Self {
            state,
            handle,
            mut outbound,
        } = self;
        let user_id = handle.user_id();
        let connection_id = handle.id();

        let (mut sender, mut incoming) = socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                    },
                    Some(event) = outbound.recv() => match serde_json::to_string(&event) {
                        Ok(json) => WsMessage::Text(json.into()),
                        Err(err) => {
                            tracing::warn!(
                                error = %err,
                                event = event.name(),
                                "failed to serialize websocket payload"
                            );
                            continue;
                        }
                    },
                    else => break,
                };
                if sender.send(message).await.is_err() {
                    tracing::warn!("Failed to write to websocket");
                    break;
                }
            }
            tracing::debug!("WebSocket发送任务结束");
        });

        // 接收任务：处理来自WebSocket客户端的消息
        let mut recv_task = {
            let state = state.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    if Self::handle_incoming(&state, &handle, message, &cmd_tx)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                tracing::debug!("WebSocket接收任务结束");
            })
        };

        // 等待任意一个任务完成（连接断开）
        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        state.dispatcher.disconnect(user_id, connection_id).await;
        tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket连接已断开");
    }

    /// 处理来自客户端的一帧；返回 Err 表示连接应当结束
    async fn handle_incoming(
        state: &AppState,
        handle: &ConnectionHandle,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Close(_) => {
                tracing::debug!(user_id = %handle.user_id(), "WebSocket收到关闭消息");
                return Err(());
            }
            WsMessage::Ping(data) => {
                if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                    tracing::warn!("Failed to send pong command");
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {}
            WsMessage::Text(text) => {
                let reply = match ClientEvent::parse(text.as_str()) {
                    Ok(event) => state.dispatcher.handle(handle, event).await,
                    Err(err) => Some(Self::reject_frame(handle, &err)),
                };
                if let Some(reply) = reply {
                    if let Err(err) = handle.push(reply) {
                        tracing::warn!(
                            error = %err,
                            user_id = %handle.user_id(),
                            "failed to queue reply"
                        );
                    }
                }
            }
            WsMessage::Binary(_) => {
                let err = ApplicationError::from(domain::DomainError::invalid_argument(
                    "frame",
                    "binary frames are not supported",
                ));
                if let Err(err) = handle.push(Self::reject_frame(handle, &err)) {
                    tracing::warn!(
                        error = %err,
                        user_id = %handle.user_id(),
                        "failed to queue reply"
                    );
                }
            }
        }
        Ok(())
    }

    fn reject_frame(handle: &ConnectionHandle, err: &ApplicationError) -> ServerEvent {
        tracing::debug!(error = %err, user_id = %handle.user_id(), "unparseable frame");
        ServerEvent::Ack(Ack::rejected(err, None))
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
