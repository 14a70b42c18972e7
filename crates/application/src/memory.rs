//! 基于内存的仓储实现，用于本地开发和测试。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use domain::{
    DeliveryStatus, DirectMessage, MessageId, PresenceStatus, RepositoryError, Timestamp, User,
    UserId,
};
use tokio::sync::RwLock;

use crate::repository::{ConversationRow, MessageRepository, UserRepository};

fn newest_first(a: &DirectMessage, b: &DirectMessage) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.0.cmp(&a.id.0))
}

fn window<T>(items: Vec<T>, offset: u64, limit: u64) -> Vec<T> {
    items
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .collect()
}

#[derive(Default)]
pub struct MemoryMessageRepository {
    messages: RwLock<HashMap<MessageId, DirectMessage>>,
}

impl MemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn between(
        messages: &HashMap<MessageId, DirectMessage>,
        a: UserId,
        b: UserId,
    ) -> Vec<DirectMessage> {
        let mut found: Vec<DirectMessage> = messages
            .values()
            .filter(|m| !m.deleted && m.involves(a) && m.peer_of(a) == b)
            .cloned()
            .collect();
        found.sort_by(newest_first);
        found
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn create(&self, message: DirectMessage) -> Result<DirectMessage, RepositoryError> {
        let mut messages = self.messages.write().await;
        if messages.contains_key(&message.id) {
            return Err(RepositoryError::Conflict);
        }
        messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<DirectMessage>, RepositoryError> {
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn mark_read(&self, id: MessageId) -> Result<bool, RepositoryError> {
        let mut messages = self.messages.write().await;
        let message = messages.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if message.status == DeliveryStatus::Read {
            return Ok(false);
        }
        message.status = DeliveryStatus::Read;
        Ok(true)
    }

    async fn update(&self, message: DirectMessage) -> Result<DirectMessage, RepositoryError> {
        let mut messages = self.messages.write().await;
        let stored = messages
            .get_mut(&message.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.content = message.content;
        stored.edited = message.edited;
        stored.deleted = message.deleted;
        Ok(stored.clone())
    }

    async fn contacts_of(&self, user_id: UserId) -> Result<Vec<UserId>, RepositoryError> {
        let messages = self.messages.read().await;
        let contacts: HashSet<UserId> = messages
            .values()
            .filter(|m| !m.deleted && m.involves(user_id))
            .map(|m| m.peer_of(user_id))
            .collect();
        Ok(contacts.into_iter().collect())
    }

    async fn conversation_rows(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationRow>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut rows: HashMap<UserId, ConversationRow> = HashMap::new();

        for message in messages.values().filter(|m| !m.deleted && m.involves(user_id)) {
            let peer_id = message.peer_of(user_id);
            let unread = u64::from(message.is_unread_by(user_id));
            match rows.get_mut(&peer_id) {
                Some(row) => {
                    row.unread_count += unread;
                    if newest_first(message, &row.last_message).is_lt() {
                        row.last_message = message.clone();
                    }
                }
                None => {
                    rows.insert(
                        peer_id,
                        ConversationRow {
                            peer_id,
                            last_message: message.clone(),
                            unread_count: unread,
                        },
                    );
                }
            }
        }

        Ok(rows.into_values().collect())
    }

    async fn history(
        &self,
        user_id: UserId,
        peer_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<DirectMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(window(Self::between(&messages, user_id, peer_id), offset, limit))
    }

    async fn count_between(
        &self,
        user_id: UserId,
        peer_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(Self::between(&messages, user_id, peer_id).len() as u64)
    }

    async fn mark_conversation_read(
        &self,
        reader_id: UserId,
        peer_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let mut messages = self.messages.write().await;
        let mut marked = 0;
        for message in messages.values_mut() {
            if message.sender_id == peer_id
                && message.recipient_id == reader_id
                && message.status == DeliveryStatus::Sent
            {
                message.status = DeliveryStatus::Read;
                marked += 1;
            }
        }
        Ok(marked)
    }
}

#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn others_sorted(users: &HashMap<UserId, User>, id: UserId) -> Vec<User> {
        let mut others: Vec<User> = users.values().filter(|u| u.id != id).cloned().collect();
        others.sort_by(|a, b| a.username.as_str().cmp(b.username.as_str()));
        others
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        let taken = users
            .values()
            .any(|existing| existing.id == user.id || existing.username == user.username);
        if taken {
            return Err(RepositoryError::Conflict);
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_profiles(&self, ids: Vec<UserId>) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn set_online(&self, id: UserId) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.go_online();
        Ok(())
    }

    async fn set_offline(&self, id: UserId, last_seen: Timestamp) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.go_offline(last_seen);
        Ok(())
    }

    async fn list_except(
        &self,
        id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<(u64, Vec<User>), RepositoryError> {
        let users = self.users.read().await;
        let others = Self::others_sorted(&users, id);
        let total = others.len() as u64;
        Ok((total, window(others, offset, limit)))
    }

    async fn search(
        &self,
        id: UserId,
        query: String,
        limit: u64,
    ) -> Result<(u64, Vec<User>), RepositoryError> {
        let needle = query.to_lowercase();
        let users = self.users.read().await;
        let matches: Vec<User> = Self::others_sorted(&users, id)
            .into_iter()
            .filter(|u| u.username.as_str().to_lowercase().contains(&needle))
            .collect();
        let total = matches.len() as u64;
        Ok((total, window(matches, 0, limit)))
    }
}
