//! 会话列表与历史记录
//!
//! 会话摘要是按需计算的只读视图：每个对方一行，包含最后一条消息和未读数，
//! 按最近活动倒序排列。查看历史记录会先把对方发给自己的消息批量标记为已读，
//! 下一次计算摘要时即可看到。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{DomainError, UserId};
use serde::Serialize;

use crate::{
    error::ApplicationError,
    events::{MessagePayload, UserProfile},
    repository::{MessageRepository, UserRepository},
};

/// 历史记录每页条数
pub const HISTORY_PAGE_SIZE: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub peer: UserProfile,
    pub last_message: MessagePayload,
    pub unread_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub data: Vec<MessagePayload>,
}

pub struct ConversationService {
    messages: Arc<dyn MessageRepository>,
    users: Arc<dyn UserRepository>,
}

impl ConversationService {
    pub fn new(messages: Arc<dyn MessageRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { messages, users }
    }

    pub async fn summaries_for(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationSummary>, ApplicationError> {
        let rows = self.messages.conversation_rows(user_id).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let peer_ids = rows.iter().map(|row| row.peer_id).collect();
        let profiles: HashMap<UserId, UserProfile> = self
            .users
            .find_profiles(peer_ids)
            .await?
            .iter()
            .map(|user| (user.id, UserProfile::from(user)))
            .collect();

        // 对方账号已不存在的会话不返回
        let mut summaries: Vec<ConversationSummary> = rows
            .into_iter()
            .filter_map(|row| {
                let peer = profiles.get(&row.peer_id)?.clone();
                Some(ConversationSummary {
                    peer,
                    last_message: MessagePayload::from(&row.last_message),
                    unread_count: row.unread_count,
                })
            })
            .collect();

        summaries.sort_by(|a, b| {
            b.last_message
                .created_at
                .cmp(&a.last_message.created_at)
                .then_with(|| b.last_message.id.cmp(&a.last_message.id))
        });
        Ok(summaries)
    }

    /// 与某个对方的历史记录，最新的在前。`page` 从 1 开始。
    pub async fn history_with(
        &self,
        viewer: UserId,
        peer: UserId,
        page: u64,
    ) -> Result<HistoryPage, ApplicationError> {
        if viewer == peer {
            return Err(
                DomainError::invalid_argument("user_id", "cannot open a conversation with yourself")
                    .into(),
            );
        }
        let page = page.max(1);

        let marked = self.messages.mark_conversation_read(viewer, peer).await?;
        if marked > 0 {
            tracing::debug!(viewer = %viewer, peer = %peer, marked, "conversation marked read");
        }

        let total = self.messages.count_between(viewer, peer).await?;
        let offset = (page - 1).saturating_mul(HISTORY_PAGE_SIZE);
        let messages = self
            .messages
            .history(viewer, peer, offset, HISTORY_PAGE_SIZE)
            .await?;

        Ok(HistoryPage {
            total,
            page,
            page_size: messages.len() as u64,
            data: messages.iter().map(MessagePayload::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryMessageRepository, MemoryUserRepository};
    use domain::{DirectMessage, MessageContent, MessageId};

    #[tokio::test]
    async fn page_far_past_the_end_is_empty() {
        let messages = Arc::new(MemoryMessageRepository::new());
        let service = ConversationService::new(
            messages.clone(),
            Arc::new(MemoryUserRepository::new()),
        );
        let (me, peer) = (UserId::generate(), UserId::generate());
        let message = DirectMessage::new(
            MessageId::generate(),
            peer,
            me,
            MessageContent::new("hi").unwrap(),
            time::OffsetDateTime::now_utc(),
        )
        .unwrap();
        messages.create(message).await.unwrap();

        let page = service.history_with(me, peer, u64::MAX).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.page, u64::MAX);
        assert!(page.data.is_empty());
    }
}
