//! Keeps at most one action in flight per chat without needing a
//! single giant lock around the whole machine.
//!
//! Each chat gets its own `tokio::sync::Mutex` the first time it's
//! touched. The lock map itself only ever grows while chats are
//! actively contended; once a chat's guard is dropped and nothing else
//! is waiting on it, [`dashmap::DashMap::remove_if`] reclaims the
//! entry so idle chats don't pin memory forever.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::state_machine::types::ChatId;

#[derive(Default)]
pub struct PerChatSerializer {
    locks: DashMap<ChatId, Arc<Mutex<()>>>,
}

impl PerChatSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the per-chat lock, running `f` while holding it, then
    /// releases and tries to clean up the map entry.
    pub async fn with_lock<F, Fut, T>(&self, chat_id: ChatId, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let guard = self.acquire(chat_id).await;
        let result = f().await;
        drop(guard);
        self.try_cleanup(chat_id);
        result
    }

    async fn acquire(&self, chat_id: ChatId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(chat_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Removes the map entry for `chat_id` only if nothing else holds
    /// a reference to its lock, i.e. no other task is currently
    /// waiting on it. Leaves contended entries alone.
    fn try_cleanup(&self, chat_id: ChatId) {
        self.locks
            .remove_if(&chat_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn map_returns_to_empty_after_use() {
        let serializer = Arc::new(PerChatSerializer::new());
        serializer.with_lock(1, || async { () }).await;
        assert_eq!(serializer.len(), 0);
    }

    #[tokio::test]
    async fn serializes_concurrent_actions_on_the_same_chat() {
        let serializer = Arc::new(PerChatSerializer::new());
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let serializer = serializer.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                serializer
                    .with_lock(42, || async move {
                        order.lock().await.push(format!("start-{i}"));
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        order.lock().await.push(format!("end-{i}"));
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let order = order.lock().await;
        // every start must be immediately followed by its own end: no
        // two chat-42 actions ever overlapped.
        for pair in order.chunks(2) {
            let start = &pair[0];
            let end = &pair[1];
            let start_id = start.trim_start_matches("start-");
            let end_id = end.trim_start_matches("end-");
            assert_eq!(start_id, end_id);
        }
        assert_eq!(serializer.len(), 0);
    }

    #[tokio::test]
    async fn different_chats_do_not_contend() {
        let serializer = Arc::new(PerChatSerializer::new());
        serializer.with_lock(1, || async { () }).await;
        serializer.with_lock(2, || async { () }).await;
        assert_eq!(serializer.len(), 0);
    }
}
