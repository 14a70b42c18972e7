use std::sync::Arc;

use application::{MessageRepository, UserRepository};
use config::DatabaseConfig;
use thiserror::Error;

use crate::{
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgMessageRepository, PgUserRepository},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// PostgreSQL 存储：连接池和基于它的仓储
#[derive(Clone)]
pub struct PgStorage {
    pub pool: sqlx::PgPool,
    pub message_repository: Arc<PgMessageRepository>,
    pub user_repository: Arc<PgUserRepository>,
}

impl PgStorage {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            pool,
        }
    }

    /// 建立连接池并执行迁移
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, InfrastructureError> {
        let pool = create_pg_pool(&config.url, config.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        tracing::info!(max_connections = config.max_connections, "database ready");
        Ok(Self::new(pool))
    }

    pub fn messages(&self) -> Arc<dyn MessageRepository> {
        self.message_repository.clone()
    }

    pub fn users(&self) -> Arc<dyn UserRepository> {
        self.user_repository.clone()
    }
}
