//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储和内嵌迁移，实现应用层定义的持久化接口。

pub mod builder;
pub mod migrations;
pub mod repository;

pub use builder::{InfrastructureError, PgStorage};
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgMessageRepository, PgUserRepository};
