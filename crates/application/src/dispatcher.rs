//! 实时事件分发
//!
//! 处理已通过身份解析的连接发来的事件：校验、持久化，并通过在线状态注册表
//! 扇出到目标用户的所有存活连接。持久化成功之后才会扇出；持久化失败只向调用方
//! 返回 `SERVER_ERROR`，不会向接收方推送任何内容。单个连接推送失败只记录日志，
//! 不影响其他连接，也不影响原操作的结果。

use std::sync::Arc;
use std::time::Duration;

use domain::{DirectMessage, DomainError, MessageContent, MessageId, UserId};

use crate::{
    clock::Clock,
    contacts::ContactResolver,
    error::ApplicationError,
    events::{Ack, ClientEvent, MessagePayload, ServerEvent, UserProfile},
    presence::{ConnectionHandle, ConnectionId, PresenceRegistry, Registration, Unregistration},
    repository::{MessageRepository, UserRepository},
    typing::TypingTimers,
};

/// `user-status` 请求最多返回的用户数
pub const USER_STATUS_LIMIT: u64 = 200;

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub to: String,
    pub content: String,
}

pub struct DispatcherDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub presence: Arc<PresenceRegistry>,
    pub clock: Arc<dyn Clock>,
    pub typing_timeout: Duration,
}

pub struct EventDispatcher {
    messages: Arc<dyn MessageRepository>,
    users: Arc<dyn UserRepository>,
    presence: Arc<PresenceRegistry>,
    contacts: ContactResolver,
    clock: Arc<dyn Clock>,
    typing: TypingTimers,
}

impl EventDispatcher {
    pub fn new(deps: DispatcherDependencies) -> Self {
        Self {
            contacts: ContactResolver::new(deps.message_repository.clone()),
            typing: TypingTimers::new(deps.typing_timeout, deps.presence.clone()),
            messages: deps.message_repository,
            users: deps.user_repository,
            presence: deps.presence,
            clock: deps.clock,
        }
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    /// 登记一个已准入的连接
    ///
    /// 用户的第一个连接会持久化在线状态并通知在线的联系人。
    pub async fn connect(&self, handle: ConnectionHandle) -> Registration {
        let user_id = handle.user_id();
        let connection_id = handle.id();
        let _transition = self.presence.lock_transitions(user_id).await;
        let registration = self.presence.register(handle).await;
        let first = registration == Registration::BecameReachable;

        tracing::info!(
            user_id = %user_id,
            connection_id = %connection_id,
            first,
            "connection registered"
        );

        if first {
            if let Err(err) = self.users.set_online(user_id).await {
                tracing::error!(
                    error = %err,
                    user_id = %user_id,
                    "failed to persist online status"
                );
            }
            self.broadcast_presence(user_id, ServerEvent::UserOnline { user_id })
                .await;
        }

        registration
    }

    /// 移除一个连接；重复的断开信号是无害的。最后一个连接断开时持久化
    /// 离线状态和最后在线时间，并通知在线的联系人。
    pub async fn disconnect(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Unregistration {
        // 同一用户的重连会等到离线持久化和广播完成之后再登记
        let _transition = self.presence.lock_transitions(user_id).await;
        let outcome = self.presence.unregister(user_id, connection_id).await;

        tracing::info!(
            user_id = %user_id,
            connection_id = %connection_id,
            outcome = ?outcome,
            "connection unregistered"
        );

        if outcome != Unregistration::BecameUnreachable {
            return outcome;
        }

        let last_seen = self.clock.now();
        if let Err(err) = self.users.set_offline(user_id, last_seen).await {
            tracing::error!(error = %err, user_id = %user_id, "failed to persist offline status");
        }
        self.broadcast_presence(user_id, ServerEvent::UserOffline { user_id, last_seen })
            .await;

        outcome
    }

    pub async fn send_message(
        &self,
        caller: UserId,
        request: SendMessageRequest,
    ) -> Result<DirectMessage, ApplicationError> {
        let to = UserId::parse(&request.to)
            .map_err(|_| DomainError::invalid_argument("to", "malformed recipient id"))?;
        let content = MessageContent::new(request.content)?;
        if to == caller {
            return Err(
                DomainError::invalid_argument("to", "cannot send a message to yourself").into(),
            );
        }

        self.users
            .find_by_id(to)
            .await
            .map_err(|err| self.storage_failure("find recipient", err))?
            .ok_or(DomainError::UserNotFound)?;

        let message =
            DirectMessage::new(MessageId::generate(), caller, to, content, self.clock.now())?;
        let message = self
            .messages
            .create(message)
            .await
            .map_err(|err| self.storage_failure("create message", err))?;

        tracing::debug!(
            message_id = %message.id,
            sender = %caller,
            recipient = %to,
            "message persisted"
        );

        self.fanout(to, ServerEvent::Message(MessagePayload::from(&message)))
            .await;
        Ok(message)
    }

    /// 接收者标记已读；已读时静默成功，且只有完成状态转换的一次调用会通知发送者
    pub async fn mark_read(
        &self,
        caller: UserId,
        message_id: MessageId,
    ) -> Result<(), ApplicationError> {
        let mut message = self.find_live_message(message_id).await?;
        if !message.mark_read(caller)? {
            return Ok(());
        }

        let transitioned = self
            .messages
            .mark_read(message_id)
            .await
            .map_err(|err| self.storage_failure("mark message read", err))?;
        if transitioned {
            self.fanout(message.sender_id, ServerEvent::MessageRead { message_id })
                .await;
        }
        Ok(())
    }

    pub async fn edit_message(
        &self,
        caller: UserId,
        message_id: MessageId,
        content: String,
    ) -> Result<DirectMessage, ApplicationError> {
        let content = MessageContent::new(content)?;
        let mut message = self.find_message(message_id).await?;
        message.edit(caller, content)?;

        self.messages
            .update(message)
            .await
            .map_err(|err| self.storage_failure("edit message", err))
    }

    pub async fn delete_message(
        &self,
        caller: UserId,
        message_id: MessageId,
    ) -> Result<(), ApplicationError> {
        let mut message = self.find_message(message_id).await?;
        if message.soft_delete(caller)? {
            self.messages
                .update(message)
                .await
                .map_err(|err| self.storage_failure("delete message", err))?;
        }
        Ok(())
    }

    /// 输入状态不持久化
    ///
    /// 开始输入会先重置自动清除定时器再推送，停止输入会先取消定时器再推送。
    pub async fn typing(
        &self,
        caller: UserId,
        to: UserId,
        is_typing: bool,
    ) -> Result<(), ApplicationError> {
        if to == caller {
            return Err(DomainError::invalid_argument("to", "cannot type to yourself").into());
        }

        if is_typing {
            // 先替换旧定时器，避免它在推送期间到期发出多余的 false
            self.typing.arm(caller, to).await;
            self.fanout(
                to,
                ServerEvent::Typing {
                    from: caller,
                    typing: true,
                },
            )
            .await;
        } else {
            self.typing.cancel(caller, to).await;
            self.fanout(
                to,
                ServerEvent::Typing {
                    from: caller,
                    typing: false,
                },
            )
            .await;
        }
        Ok(())
    }

    pub async fn user_statuses(
        &self,
        caller: UserId,
    ) -> Result<Vec<UserProfile>, ApplicationError> {
        let (_, users) = self
            .users
            .list_except(caller, 0, USER_STATUS_LIMIT)
            .await
            .map_err(|err| self.storage_failure("list users", err))?;
        Ok(users.iter().map(UserProfile::from).collect())
    }

    /// 处理连接上收到的一个事件，返回需要回给该连接的应答（如果有）
    pub async fn handle(
        &self,
        connection: &ConnectionHandle,
        event: ClientEvent,
    ) -> Option<ServerEvent> {
        let caller = connection.user_id();
        match event {
            ClientEvent::SendMessage {
                to,
                content,
                request_id,
            } => {
                let request = SendMessageRequest { to, content };
                let ack = match self.send_message(caller, request).await {
                    Ok(message) => Ack::accepted(message.id, request_id),
                    Err(err) => {
                        tracing::debug!(error = %err, user_id = %caller, "send-message rejected");
                        Ack::rejected(&err, request_id)
                    }
                };
                Some(ServerEvent::Ack(ack))
            }
            ClientEvent::MarkRead { message_id } => {
                let result = match MessageId::parse(&message_id) {
                    Ok(message_id) => self.mark_read(caller, message_id).await,
                    Err(err) => Err(err.into()),
                };
                if let Err(err) = result {
                    tracing::debug!(error = %err, user_id = %caller, "mark-read rejected");
                }
                None
            }
            ClientEvent::Typing { to, typing } => {
                let result = match UserId::parse(&to) {
                    Ok(to) => self.typing(caller, to, typing).await,
                    Err(err) => Err(err.into()),
                };
                if let Err(err) = result {
                    tracing::debug!(error = %err, user_id = %caller, "typing rejected");
                }
                None
            }
            ClientEvent::UserStatus {} => match self.user_statuses(caller).await {
                Ok(users) => Some(ServerEvent::UserStatus { users }),
                Err(err) => {
                    tracing::warn!(error = %err, user_id = %caller, "user-status failed");
                    None
                }
            },
        }
    }

    /// 推送事件到用户的每个存活连接，返回成功推送的连接数
    pub async fn fanout(&self, user_id: UserId, event: ServerEvent) -> usize {
        let connections = self.presence.connections_for(user_id).await;
        let mut delivered = 0;
        for connection in connections {
            match connection.push(event.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        user_id = %user_id,
                        event = event.name(),
                        "push to connection failed"
                    );
                }
            }
        }
        delivered
    }

    async fn broadcast_presence(&self, user_id: UserId, event: ServerEvent) {
        let contacts = match self
            .contacts
            .reachable_contacts(user_id, &self.presence)
            .await
        {
            Ok(contacts) => contacts,
            Err(err) => {
                tracing::error!(error = %err, user_id = %user_id, "failed to resolve contacts");
                return;
            }
        };

        for contact in contacts {
            self.fanout(contact, event.clone()).await;
        }
    }

    // 包含已删除的消息
    async fn find_message(&self, message_id: MessageId) -> Result<DirectMessage, ApplicationError> {
        self.messages
            .find_by_id(message_id)
            .await
            .map_err(|err| self.storage_failure("find message", err))?
            .ok_or_else(|| DomainError::MessageNotFound.into())
    }

    async fn find_live_message(
        &self,
        message_id: MessageId,
    ) -> Result<DirectMessage, ApplicationError> {
        let message = self.find_message(message_id).await?;
        if message.deleted {
            return Err(DomainError::MessageNotFound.into());
        }
        Ok(message)
    }

    fn storage_failure(
        &self,
        operation: &'static str,
        err: domain::RepositoryError,
    ) -> ApplicationError {
        tracing::error!(error = %err, operation, "persistence failure");
        ApplicationError::from(err)
    }
}
