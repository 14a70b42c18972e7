use async_trait::async_trait;
use application::{ConversationRow, MessageRepository, UserRepository};
use domain::{
    DeliveryStatus, DirectMessage, MessageContent, MessageId, PresenceStatus, RepositoryError,
    Timestamp, User, UserId, Username,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return RepositoryError::Conflict;
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

/// 转义 LIKE 模式中的通配符
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

const MESSAGE_COLUMNS: &str =
    "id, sender_id, recipient_id, content, status, edited, deleted, created_at";

const USER_COLUMNS: &str = "id, username, avatar, status, last_seen_at, created_at";

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    sender_id: Uuid,
    recipient_id: Uuid,
    content: String,
    status: String,
    edited: bool,
    deleted: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for DirectMessage {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        let status = value
            .status
            .parse::<DeliveryStatus>()
            .map_err(|err| invalid_data(err.to_string()))?;

        Ok(DirectMessage {
            id: MessageId::from(value.id),
            sender_id: UserId::from(value.sender_id),
            recipient_id: UserId::from(value.recipient_id),
            content,
            status,
            edited: value.edited,
            deleted: value.deleted,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ConversationRecord {
    #[sqlx(flatten)]
    message: MessageRecord,
    peer_id: Uuid,
    unread_count: i64,
}

impl TryFrom<ConversationRecord> for ConversationRow {
    type Error = RepositoryError;

    fn try_from(value: ConversationRecord) -> Result<Self, Self::Error> {
        Ok(ConversationRow {
            peer_id: UserId::from(value.peer_id),
            last_message: DirectMessage::try_from(value.message)?,
            unread_count: to_u64(value.unread_count),
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    avatar: Option<String>,
    status: String,
    last_seen_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let username =
            Username::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        let status = value
            .status
            .parse::<PresenceStatus>()
            .map_err(|err| invalid_data(err.to_string()))?;

        Ok(User {
            id: UserId::from(value.id),
            username,
            avatar: value.avatar,
            status,
            last_seen_at: value.last_seen_at,
            created_at: value.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: DirectMessage) -> Result<DirectMessage, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO direct_messages ({MESSAGE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.sender_id))
        .bind(Uuid::from(message.recipient_id))
        .bind(message.content.as_str())
        .bind(message.status.as_str())
        .bind(message.edited)
        .bind(message.deleted)
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        DirectMessage::try_from(record)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<DirectMessage>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM direct_messages WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(DirectMessage::try_from).transpose()
    }

    async fn mark_read(&self, id: MessageId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE direct_messages SET status = 'read' WHERE id = $1 AND status = 'sent'",
        )
        .bind(Uuid::from(id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update(&self, message: DirectMessage) -> Result<DirectMessage, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            UPDATE direct_messages
            SET content = $2, edited = $3, deleted = $4
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(message.id))
        .bind(message.content.as_str())
        .bind(message.edited)
        .bind(message.deleted)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        DirectMessage::try_from(record)
    }

    async fn contacts_of(&self, user_id: UserId) -> Result<Vec<UserId>, RepositoryError> {
        let peers = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT CASE WHEN sender_id = $1 THEN recipient_id ELSE sender_id END
            FROM direct_messages
            WHERE (sender_id = $1 OR recipient_id = $1) AND NOT deleted
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(peers.into_iter().map(UserId::from).collect())
    }

    async fn conversation_rows(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationRow>, RepositoryError> {
        let records = sqlx::query_as::<_, ConversationRecord>(
            r#"
            WITH visible AS (
                SELECT m.*,
                       CASE WHEN m.sender_id = $1 THEN m.recipient_id ELSE m.sender_id END AS peer_id
                FROM direct_messages m
                WHERE (m.sender_id = $1 OR m.recipient_id = $1) AND NOT m.deleted
            ),
            latest AS (
                SELECT DISTINCT ON (peer_id) *
                FROM visible
                ORDER BY peer_id, created_at DESC, id DESC
            ),
            unread AS (
                SELECT peer_id,
                       COUNT(*) FILTER (WHERE recipient_id = $1 AND status = 'sent') AS unread_count
                FROM visible
                GROUP BY peer_id
            )
            SELECT l.id, l.sender_id, l.recipient_id, l.content, l.status, l.edited, l.deleted,
                   l.created_at, l.peer_id, u.unread_count
            FROM latest l
            JOIN unread u ON u.peer_id = l.peer_id
            ORDER BY l.created_at DESC, l.id DESC
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(ConversationRow::try_from).collect()
    }

    async fn history(
        &self,
        user_id: UserId,
        peer_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<DirectMessage>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM direct_messages
            WHERE ((sender_id = $1 AND recipient_id = $2) OR (sender_id = $2 AND recipient_id = $1))
              AND NOT deleted
            ORDER BY created_at DESC, id DESC
            OFFSET $3 LIMIT $4
            "#
        ))
        .bind(Uuid::from(user_id))
        .bind(Uuid::from(peer_id))
        .bind(to_i64(offset))
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(DirectMessage::try_from).collect()
    }

    async fn count_between(
        &self,
        user_id: UserId,
        peer_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM direct_messages
            WHERE ((sender_id = $1 AND recipient_id = $2) OR (sender_id = $2 AND recipient_id = $1))
              AND NOT deleted
            "#,
        )
        .bind(Uuid::from(user_id))
        .bind(Uuid::from(peer_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(to_u64(count))
    }

    async fn mark_conversation_read(
        &self,
        reader_id: UserId,
        peer_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE direct_messages
            SET status = 'read'
            WHERE sender_id = $2 AND recipient_id = $1 AND status = 'sent'
            "#,
        )
        .bind(Uuid::from(reader_id))
        .bind(Uuid::from(peer_id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn set_status(
        &self,
        id: UserId,
        status: PresenceStatus,
        last_seen: Option<Timestamp>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET status = $2, last_seen_at = COALESCE($3, last_seen_at)
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .bind(status.as_str())
        .bind(last_seen)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            INSERT INTO users ({USER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::from(user.id))
        .bind(user.username.as_str())
        .bind(user.avatar.as_deref())
        .bind(user.status.as_str())
        .bind(user.last_seen_at)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        User::try_from(record)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_profiles(&self, ids: Vec<UserId>) -> Result<Vec<User>, RepositoryError> {
        let ids: Vec<Uuid> = ids.into_iter().map(Uuid::from).collect();
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(User::try_from).collect()
    }

    async fn set_online(&self, id: UserId) -> Result<(), RepositoryError> {
        self.set_status(id, PresenceStatus::Online, None).await
    }

    async fn set_offline(&self, id: UserId, last_seen: Timestamp) -> Result<(), RepositoryError> {
        self.set_status(id, PresenceStatus::Offline, Some(last_seen))
            .await
    }

    async fn list_except(
        &self,
        id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<(u64, Vec<User>), RepositoryError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id <> $1")
            .bind(Uuid::from(id))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let records = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE id <> $1
            ORDER BY username
            OFFSET $2 LIMIT $3
            "#
        ))
        .bind(Uuid::from(id))
        .bind(to_i64(offset))
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let users = records
            .into_iter()
            .map(User::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((to_u64(total), users))
    }

    async fn search(
        &self,
        id: UserId,
        query: String,
        limit: u64,
    ) -> Result<(u64, Vec<User>), RepositoryError> {
        let pattern = format!("%{}%", escape_like(&query));

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE id <> $1 AND username ILIKE $2",
        )
        .bind(Uuid::from(id))
        .bind(pattern.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let records = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE id <> $1 AND username ILIKE $2
            ORDER BY username
            LIMIT $3
            "#
        ))
        .bind(Uuid::from(id))
        .bind(pattern.as_str())
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let users = records
            .into_iter()
            .map(User::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((to_u64(total), users))
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
