//! 在线状态注册表
//!
//! 记录每个用户当前存活的连接集合。用户在映射中出现当且仅当其至少有一个连接。
//! 所有读写都经过同一把锁，因此针对同一用户的 register/unregister/connections_for
//! 是线性一致的；上线/下线只在 0→1、1→0 的边沿上报告一次。
//!
//! 上下线转换之后的持久化与广播由 [`PresenceRegistry::lock_transitions`] 按用户串行化，
//! 不同用户之间互不阻塞。

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use domain::UserId;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::events::ServerEvent;

/// 连接唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    #[error("outbound queue of connection {0} is full")]
    Full(ConnectionId),
}

/// 单个存活连接的发送端
///
/// 事件写入连接自己的发送队列，由传输层负责写出。
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    sender: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    /// 为用户创建一个新连接及其发送队列的接收端
    pub fn channel(user_id: UserId, capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let handle = Self {
            id: ConnectionId::generate(),
            user_id,
            sender,
        };
        (handle, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// 不阻塞地推送事件，队列满或连接已关闭时返回错误
    pub fn push(&self, event: ServerEvent) -> Result<(), PushError> {
        self.sender.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => PushError::Full(self.id),
            mpsc::error::TrySendError::Closed(_) => PushError::Closed(self.id),
        })
    }
}

/// register 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// 用户的第一个连接，用户变为可达
    BecameReachable,
    /// 用户已有其他连接
    AlreadyReachable,
}

/// unregister 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unregistration {
    /// 用户的最后一个连接，用户变为不可达
    BecameUnreachable,
    /// 用户仍有其他连接
    StillReachable,
    /// 连接早已移除（重复的断开信号）
    Unknown,
}

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    connections: RwLock<HashMap<UserId, HashMap<ConnectionId, ConnectionHandle>>>,
    transitions: StdMutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

/// 持有期间同一用户的其他上下线转换会等待
pub struct TransitionGuard<'a> {
    registry: &'a PresenceRegistry,
    user_id: UserId,
    _lock: OwnedMutexGuard<()>,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .registry
            .transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // 只剩映射和自己持有时说明没有等待者
        if locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(&self.user_id);
        }
    }
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取用户的转换锁。register/unregister 以及随后的持久化和广播都应在持锁期间完成。
    pub async fn lock_transitions(&self, user_id: UserId) -> TransitionGuard<'_> {
        let lock = {
            let mut locks = self
                .transitions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks.entry(user_id).or_default().clone()
        };
        TransitionGuard {
            registry: self,
            user_id,
            _lock: lock.lock_owned().await,
        }
    }

    pub async fn register(&self, handle: ConnectionHandle) -> Registration {
        let mut connections = self.connections.write().await;
        let user_connections = connections.entry(handle.user_id).or_default();
        let first = user_connections.is_empty();
        user_connections.insert(handle.id, handle);

        if first {
            Registration::BecameReachable
        } else {
            Registration::AlreadyReachable
        }
    }

    pub async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> Unregistration {
        let mut connections = self.connections.write().await;
        let Some(user_connections) = connections.get_mut(&user_id) else {
            return Unregistration::Unknown;
        };
        if user_connections.remove(&connection_id).is_none() {
            return Unregistration::Unknown;
        }
        if user_connections.is_empty() {
            connections.remove(&user_id);
            Unregistration::BecameUnreachable
        } else {
            Unregistration::StillReachable
        }
    }

    /// 当前存活连接的快照，可能为空
    pub async fn connections_for(&self, user_id: UserId) -> Vec<ConnectionHandle> {
        let connections = self.connections.read().await;
        connections
            .get(&user_id)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.connections.read().await.contains_key(&user_id)
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.connections.read().await.keys().copied().collect()
    }
}
