//! 实时通道上的事件格式。
//!
//! 所有帧都是 `{"event": "<name>", "data": {...}}` 形式的 JSON，字段使用 camelCase。

use domain::{DeliveryStatus, DirectMessage, MessageId, PresenceStatus, Timestamp, User, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{ApplicationError, ErrorCode};

/// 客户端发来的事件
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        to: String,
        content: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    MarkRead { message_id: String },
    Typing { to: String, typing: bool },
    UserStatus {},
}

impl ClientEvent {
    pub fn parse(frame: &str) -> Result<Self, ApplicationError> {
        serde_json::from_str(frame).map_err(|err| {
            ApplicationError::Domain(domain::DomainError::invalid_argument(
                "frame",
                format!("unrecognized event: {err}"),
            ))
        })
    }
}

/// 推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Message(MessagePayload),
    #[serde(rename_all = "camelCase")]
    MessageRead { message_id: MessageId },
    Typing { from: UserId, typing: bool },
    #[serde(rename_all = "camelCase")]
    UserOnline { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    UserOffline {
        user_id: UserId,
        #[serde(with = "time::serde::rfc3339")]
        last_seen: Timestamp,
    },
    Ack(Ack),
    UserStatus { users: Vec<UserProfile> },
}

impl ServerEvent {
    /// 用于日志的事件名
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Message(_) => "message",
            ServerEvent::MessageRead { .. } => "message-read",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::UserOnline { .. } => "user-online",
            ServerEvent::UserOffline { .. } => "user-offline",
            ServerEvent::Ack(_) => "ack",
            ServerEvent::UserStatus { .. } => "user-status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: MessageId,
    pub sender: UserId,
    pub recipient: UserId,
    pub content: String,
    pub status: DeliveryStatus,
    pub edited: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl From<&DirectMessage> for MessagePayload {
    fn from(message: &DirectMessage) -> Self {
        Self {
            id: message.id,
            sender: message.sender_id,
            recipient: message.recipient_id,
            content: message.content.as_str().to_owned(),
            status: message.status,
            edited: message.edited,
            created_at: message.created_at,
        }
    }
}

/// 用户公开资料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub avatar: Option<String>,
    pub status: PresenceStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen: Option<Timestamp>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.as_str().to_owned(),
            avatar: user.avatar.clone(),
            status: user.status,
            last_seen: user.last_seen_at,
        }
    }
}

/// `send-message` 的应答：确认持久化成功，不代表已投递
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Ack {
    pub fn accepted(id: MessageId, request_id: Option<String>) -> Self {
        Self {
            ok: true,
            id: Some(id),
            code: None,
            message: None,
            request_id,
        }
    }

    pub fn rejected(error: &ApplicationError, request_id: Option<String>) -> Self {
        Self {
            ok: false,
            id: None,
            code: Some(error.code()),
            message: Some(error.public_message()),
            request_id,
        }
    }
}
