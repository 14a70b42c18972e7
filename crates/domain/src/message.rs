use std::fmt;
use std::str::FromStr;

use crate::errors::DomainError;
use crate::value_objects::{MessageContent, MessageId, Timestamp, UserId};

/// 投递状态，只能由 `Sent` 前进到 `Read`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Read,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Read => "read",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DeliveryStatus::Sent),
            "read" => Ok(DeliveryStatus::Read),
            other => Err(DomainError::invalid_argument(
                "status",
                format!("unknown delivery status {other}"),
            )),
        }
    }
}

/// 一对一私信
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DirectMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: MessageContent,
    pub status: DeliveryStatus,
    pub edited: bool,
    /// 软删除标记，记录不会被物理删除
    pub deleted: bool,
    pub created_at: Timestamp,
}

impl DirectMessage {
    pub fn new(
        id: MessageId,
        sender_id: UserId,
        recipient_id: UserId,
        content: MessageContent,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if sender_id == recipient_id {
            return Err(DomainError::invalid_argument(
                "to",
                "cannot send a message to yourself",
            ));
        }
        Ok(Self {
            id,
            sender_id,
            recipient_id,
            content,
            status: DeliveryStatus::Sent,
            edited: false,
            deleted: false,
            created_at,
        })
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.sender_id == user_id || self.recipient_id == user_id
    }

    /// 对话中相对于 `user_id` 的另一方
    pub fn peer_of(&self, user_id: UserId) -> UserId {
        if self.sender_id == user_id {
            self.recipient_id
        } else {
            self.sender_id
        }
    }

    pub fn is_unread_by(&self, user_id: UserId) -> bool {
        self.recipient_id == user_id && self.status != DeliveryStatus::Read
    }

    /// 只有接收者可以标记已读。返回值表示状态是否发生了变化。
    pub fn mark_read(&mut self, by: UserId) -> Result<bool, DomainError> {
        if by != self.recipient_id {
            return Err(DomainError::OperationNotAllowed);
        }
        if self.status == DeliveryStatus::Read {
            return Ok(false);
        }
        self.status = DeliveryStatus::Read;
        Ok(true)
    }

    /// 只有发送者可以编辑，已删除的消息不可编辑。
    pub fn edit(&mut self, by: UserId, content: MessageContent) -> Result<(), DomainError> {
        if by != self.sender_id || self.deleted {
            return Err(DomainError::OperationNotAllowed);
        }
        self.content = content;
        self.edited = true;
        Ok(())
    }

    /// 只有发送者可以删除。返回值表示删除标记是否发生了变化。
    pub fn soft_delete(&mut self, by: UserId) -> Result<bool, DomainError> {
        if by != self.sender_id {
            return Err(DomainError::OperationNotAllowed);
        }
        if self.deleted {
            return Ok(false);
        }
        self.deleted = true;
        Ok(true)
    }
}
