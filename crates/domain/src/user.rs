use std::fmt;
use std::str::FromStr;

use crate::errors::DomainError;
use crate::value_objects::{Timestamp, UserId, Username};

/// 持久化的在线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(PresenceStatus::Online),
            "offline" => Ok(PresenceStatus::Offline),
            other => Err(DomainError::invalid_argument(
                "status",
                format!("unknown presence status {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub avatar: Option<String>,
    pub status: PresenceStatus,
    /// 最后一个连接断开的时间
    pub last_seen_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl User {
    pub fn new(id: UserId, username: Username, now: Timestamp) -> Self {
        Self {
            id,
            username,
            avatar: None,
            status: PresenceStatus::Offline,
            last_seen_at: None,
            created_at: now,
        }
    }

    pub fn go_online(&mut self) {
        self.status = PresenceStatus::Online;
    }

    pub fn go_offline(&mut self, at: Timestamp) {
        self.status = PresenceStatus::Offline;
        self.last_seen_at = Some(at);
    }
}
