//! 主应用程序入口
//!
//! 读取配置，装配存储、分发器和 Web API，启动 Axum 服务。

use std::sync::Arc;

use anyhow::Context;
use application::{
    ConversationService, DispatcherDependencies, EventDispatcher, MemoryMessageRepository,
    MemoryUserRepository, MessageRepository, PresenceRegistry, SystemClock, UserDirectory,
    UserRepository,
};
use config::{AppConfig, StorageBackend};
use infrastructure::PgStorage;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtIdentityResolver, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    let (messages, users) = open_storage(&config).await?;

    let dispatcher = Arc::new(EventDispatcher::new(DispatcherDependencies {
        message_repository: messages.clone(),
        user_repository: users.clone(),
        presence: Arc::new(PresenceRegistry::new()),
        clock: Arc::new(SystemClock),
        typing_timeout: config.realtime.typing_timeout(),
    }));
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState::new(
        dispatcher,
        Arc::new(ConversationService::new(messages, users.clone())),
        Arc::new(UserDirectory::new(users.clone())),
        Arc::new(JwtIdentityResolver::new(jwt_service, users)),
        config.realtime.outbound_buffer,
    );

    // 启动 Web 服务器
    let app = router(state);
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!(address = %address, "私信服务已启动");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务已停止");
    Ok(())
}

async fn open_storage(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn MessageRepository>, Arc<dyn UserRepository>)> {
    match config.database.backend {
        StorageBackend::Postgres => {
            tracing::info!(
                database = config.database.url.split('@').next_back().unwrap_or("unknown"),
                "连接数据库"
            );
            let storage = PgStorage::connect(&config.database)
                .await
                .context("failed to initialise PostgreSQL storage")?;
            Ok((storage.messages(), storage.users()))
        }
        StorageBackend::Memory => {
            tracing::warn!("使用内存存储，重启后数据不会保留");
            Ok((
                Arc::new(MemoryMessageRepository::new()),
                Arc::new(MemoryUserRepository::new()),
            ))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
