//! Process-local storage backend. Nothing survives a restart; useful
//! for the demo binary and for tests that don't want a database.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::persist::StorageBackend;
use crate::state_machine::types::{ChatId, StateCode};
use crate::util::error::Result;

#[derive(Default)]
pub struct InMemoryStorage {
    states: DashMap<ChatId, StateCode>,
    contexts: DashMap<ChatId, Value>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn get_state(&self, chat_id: ChatId) -> Result<Option<StateCode>> {
        Ok(self.states.get(&chat_id).map(|v| v.clone()))
    }

    async fn set_state(&self, chat_id: ChatId, state_code: &str) -> Result<()> {
        self.states.insert(chat_id, state_code.to_owned());
        Ok(())
    }

    async fn get_context(&self, chat_id: ChatId) -> Result<Value> {
        Ok(self
            .contexts
            .get(&chat_id)
            .map(|v| v.clone())
            .unwrap_or(Value::Null))
    }

    async fn set_context(&self, chat_id: ChatId, context: Value) -> Result<()> {
        self.contexts.insert(chat_id, context);
        Ok(())
    }

    async fn forget(&self, chat_id: ChatId) -> Result<()> {
        self.states.remove(&chat_id);
        self.contexts.remove(&chat_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseen_chat_has_no_state_and_null_context() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.get_state(1).await.unwrap(), None);
        assert_eq!(storage.get_context(1).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let storage = InMemoryStorage::new();
        storage.set_state(1, "main_menu").await.unwrap();
        storage
            .set_context(1, serde_json::json!({ "name": "ada" }))
            .await
            .unwrap();
        assert_eq!(
            storage.get_state(1).await.unwrap(),
            Some("main_menu".to_owned())
        );
        assert_eq!(
            storage.get_context(1).await.unwrap(),
            serde_json::json!({ "name": "ada" })
        );
    }

    #[tokio::test]
    async fn forget_clears_both() {
        let storage = InMemoryStorage::new();
        storage.set_state(1, "main_menu").await.unwrap();
        storage.set_context(1, serde_json::json!({})).await.unwrap();
        storage.forget(1).await.unwrap();
        assert_eq!(storage.get_state(1).await.unwrap(), None);
        assert_eq!(storage.get_context(1).await.unwrap(), Value::Null);
    }
}
