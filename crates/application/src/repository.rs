use async_trait::async_trait;
use domain::{DirectMessage, MessageId, RepositoryError, Timestamp, User, UserId};

/// 每个对话一行：对方、最后一条未删除消息、未读数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRow {
    pub peer_id: UserId,
    pub last_message: DirectMessage,
    pub unread_count: u64,
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: DirectMessage) -> Result<DirectMessage, RepositoryError>;

    // 包含已软删除的消息
    async fn find_by_id(&self, id: MessageId) -> Result<Option<DirectMessage>, RepositoryError>;

    /// 条件更新 sent → read，只有真正完成状态转换的调用返回 true
    async fn mark_read(&self, id: MessageId) -> Result<bool, RepositoryError>;

    /// 持久化内容、编辑和删除标记
    async fn update(&self, message: DirectMessage) -> Result<DirectMessage, RepositoryError>;

    /// 与该用户互发过未删除消息的所有用户
    async fn contacts_of(&self, user_id: UserId) -> Result<Vec<UserId>, RepositoryError>;

    async fn conversation_rows(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationRow>, RepositoryError>;

    /// 两人之间的未删除消息，按时间倒序
    async fn history(
        &self,
        user_id: UserId,
        peer_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<DirectMessage>, RepositoryError>;

    async fn count_between(&self, user_id: UserId, peer_id: UserId)
        -> Result<u64, RepositoryError>;

    /// 将 `peer_id` 发给 `reader_id` 的消息批量标记为已读，返回受影响条数
    async fn mark_conversation_read(
        &self,
        reader_id: UserId,
        peer_id: UserId,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_profiles(&self, ids: Vec<UserId>) -> Result<Vec<User>, RepositoryError>;
    async fn set_online(&self, id: UserId) -> Result<(), RepositoryError>;
    async fn set_offline(&self, id: UserId, last_seen: Timestamp) -> Result<(), RepositoryError>;

    /// 除自己以外的用户，按用户名排序
    async fn list_except(
        &self,
        id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<(u64, Vec<User>), RepositoryError>;

    /// 用户名不区分大小写的子串匹配
    async fn search(
        &self,
        id: UserId,
        query: String,
        limit: u64,
    ) -> Result<(u64, Vec<User>), RepositoryError>;
}
