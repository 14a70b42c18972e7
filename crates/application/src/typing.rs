//! 输入状态定时器
//!
//! 每个 (发送方, 接收方) 一个可取消的定时任务。重新 arm 会替换旧任务而不是叠加；
//! 定时任务触发时在同一把锁下核对自己的代数，被取消或被替换的任务不会再推送。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use domain::UserId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::{events::ServerEvent, presence::PresenceRegistry};

type TypingKey = (UserId, UserId);

struct TimerSlot {
    generation: u64,
    task: JoinHandle<()>,
}

pub struct TypingTimers {
    timeout: Duration,
    presence: Arc<PresenceRegistry>,
    slots: Arc<Mutex<HashMap<TypingKey, TimerSlot>>>,
    generations: AtomicU64,
}

impl TypingTimers {
    pub fn new(timeout: Duration, presence: Arc<PresenceRegistry>) -> Self {
        Self {
            timeout,
            presence,
            slots: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    /// 启动或重置 `from` → `to` 的自动清除定时器
    pub async fn arm(&self, from: UserId, to: UserId) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let key = (from, to);

        let mut slots = self.slots.lock().await;
        let task = tokio::spawn(Self::expire(
            self.slots.clone(),
            self.presence.clone(),
            key,
            generation,
            self.timeout,
        ));
        if let Some(previous) = slots.insert(key, TimerSlot { generation, task }) {
            previous.task.abort();
        }
    }

    /// 取消待触发的定时器，返回是否存在
    pub async fn cancel(&self, from: UserId, to: UserId) -> bool {
        let mut slots = self.slots.lock().await;
        match slots.remove(&(from, to)) {
            Some(slot) => {
                slot.task.abort();
                true
            }
            None => false,
        }
    }

    pub async fn pending(&self) -> usize {
        self.slots.lock().await.len()
    }

    async fn expire(
        slots: Arc<Mutex<HashMap<TypingKey, TimerSlot>>>,
        presence: Arc<PresenceRegistry>,
        key: TypingKey,
        generation: u64,
        timeout: Duration,
    ) {
        tokio::time::sleep(timeout).await;

        let mut slots = slots.lock().await;
        match slots.get(&key) {
            Some(slot) if slot.generation == generation => {
                slots.remove(&key);
            }
            _ => return,
        }

        let (from, to) = key;
        let event = ServerEvent::Typing {
            from,
            typing: false,
        };
        // 持锁推送：cancel/arm 不可能与这里交错
        for connection in presence.connections_for(to).await {
            if let Err(err) = connection.push(event.clone()) {
                tracing::warn!(
                    error = %err,
                    from = %from,
                    to = %to,
                    "typing auto-clear push failed"
                );
            }
        }
        tracing::debug!(from = %from, to = %to, "typing indicator expired");
    }
}

impl Drop for TypingTimers {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.slots.try_lock() {
            for (_, slot) in slots.drain() {
                slot.task.abort();
            }
        }
    }
}
