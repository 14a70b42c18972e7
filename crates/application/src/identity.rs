use async_trait::async_trait;
use domain::UserId;

use crate::error::ApplicationError;

/// 将连接时提供的凭证解析为稳定的用户标识。
///
/// 凭证缺失、无效或者对应的用户不存在时返回
/// [`ApplicationError::Authentication`]，连接在任何事件交换之前被拒绝。
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<UserId, ApplicationError>;
}
