use std::collections::HashSet;
use std::sync::Arc;

use domain::UserId;

use crate::{error::ApplicationError, presence::PresenceRegistry, repository::MessageRepository};

/// 计算需要接收某个用户上下线通知的联系人：所有与其互发过未删除消息的用户。
///
/// 每次上下线都重新查询，不做缓存。
#[derive(Clone)]
pub struct ContactResolver {
    messages: Arc<dyn MessageRepository>,
}

impl ContactResolver {
    pub fn new(messages: Arc<dyn MessageRepository>) -> Self {
        Self { messages }
    }

    pub async fn contacts_of(&self, user_id: UserId) -> Result<HashSet<UserId>, ApplicationError> {
        let contacts = self.messages.contacts_of(user_id).await?;
        Ok(contacts
            .into_iter()
            .filter(|contact| *contact != user_id)
            .collect())
    }

    /// 当前至少有一个存活连接的联系人
    pub async fn reachable_contacts(
        &self,
        user_id: UserId,
        presence: &PresenceRegistry,
    ) -> Result<Vec<UserId>, ApplicationError> {
        let mut reachable = Vec::new();
        for contact in self.contacts_of(user_id).await? {
            if presence.is_online(contact).await {
                reachable.push(contact);
            }
        }
        Ok(reachable)
    }
}
