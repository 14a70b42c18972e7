use std::sync::Arc;

use domain::{DomainError, UserId};
use serde::Serialize;

use crate::{error::ApplicationError, events::UserProfile, repository::UserRepository};

pub const DEFAULT_PAGE_LIMIT: u64 = 20;
pub const MAX_PAGE_LIMIT: u64 = 50;
pub const SEARCH_LIMIT: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub data: Vec<UserProfile>,
}

/// 浏览和搜索其他用户
pub struct UserDirectory {
    users: Arc<dyn UserRepository>,
}

impl UserDirectory {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    pub async fn profile(&self, id: UserId) -> Result<UserProfile, ApplicationError> {
        let user = self
            .users
            .find_by_id(id)
            .await?
            .ok_or(DomainError::UserNotFound)?;
        Ok(UserProfile::from(&user))
    }

    pub async fn list(
        &self,
        caller: UserId,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> Result<UserPage, ApplicationError> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);

        let offset = (page - 1).saturating_mul(limit);
        let (total, users) = self.users.list_except(caller, offset, limit).await?;
        Ok(Self::page(total, page, &users))
    }

    pub async fn search(&self, caller: UserId, query: &str) -> Result<UserPage, ApplicationError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Self::page(0, 1, &[]));
        }
        let (total, users) = self
            .users
            .search(caller, query.to_owned(), SEARCH_LIMIT)
            .await?;
        Ok(Self::page(total, 1, &users))
    }

    fn page(total: u64, page: u64, users: &[domain::User]) -> UserPage {
        UserPage {
            total,
            page,
            page_size: users.len() as u64,
            data: users.iter().map(UserProfile::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryUserRepository;
    use domain::{User, Username};

    #[tokio::test]
    async fn huge_page_number_yields_an_empty_page() {
        let users = Arc::new(MemoryUserRepository::new());
        let now = time::OffsetDateTime::now_utc();
        let me = UserId::generate();
        for name in ["alice", "bob"] {
            let user = User::new(UserId::generate(), Username::parse(name).unwrap(), now);
            users.create(user).await.unwrap();
        }
        let directory = UserDirectory::new(users);

        let page = directory
            .list(me, Some(u64::MAX), Some(MAX_PAGE_LIMIT))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(page.data.is_empty());

        let first = directory.list(me, None, Some(0)).await.unwrap();
        assert_eq!(first.page_size, 1);
    }
}
