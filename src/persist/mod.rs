//! Pluggable persistence for a chat's current state and its context.

use async_trait::async_trait;
use serde_json::Value;

use crate::state_machine::types::{ChatId, StateCode};
use crate::util::error::Result;

pub mod durable;
pub mod entities;
pub mod memory;

/// What the machine needs from storage: read and upsert a chat's
/// current state code and its context blob. Both are stored
/// independently so a state-only update (most common, on enter/exit)
/// doesn't need to round-trip the whole context.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Current state code for `chat_id`, or `None` if this chat has
    /// never been seen before.
    async fn get_state(&self, chat_id: ChatId) -> Result<Option<StateCode>>;

    /// Upserts the chat's current state code.
    async fn set_state(&self, chat_id: ChatId, state_code: &str) -> Result<()>;

    /// Current context for `chat_id` as a JSON value, or `Value::Null`
    /// if this chat has no stored context yet.
    async fn get_context(&self, chat_id: ChatId) -> Result<Value>;

    /// Upserts the chat's context.
    async fn set_context(&self, chat_id: ChatId, context: Value) -> Result<()>;

    /// Removes every stored row for `chat_id`. Used in tests and by
    /// administrative tooling; the machine itself never resets a chat
    /// back to "never seen".
    async fn forget(&self, chat_id: ChatId) -> Result<()>;
}
