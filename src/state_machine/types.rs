//! Primitive identifiers and the action enum that enters the machine.

use serde_json::Value;

/// Identifies a chat. The original source keys everything off a bare
/// integer chat id, so we do the same rather than wrapping it in a
/// newtype nobody asked for.
pub type ChatId = i64;

/// The name of a registered [`crate::state_machine::State`]. Plain
/// strings, matching `state_code` as stored in both backends.
pub type StateCode = String;

/// A message delivered to a chat's current state.
#[derive(Debug, Clone)]
pub struct MessagePayload {
    pub text: String,
    pub raw: Value,
}

/// A callback query (inline button press) delivered to a chat's
/// current state.
#[derive(Debug, Clone)]
pub struct CallbackPayload {
    pub data: String,
    pub raw: Value,
}

/// Everything the machine can be asked to handle for a chat.
#[derive(Debug, Clone)]
pub enum Action {
    Message {
        chat_id: ChatId,
        text: String,
        raw: Value,
    },
    CallbackQuery {
        chat_id: ChatId,
        data: String,
        raw: Value,
    },
}

impl Action {
    pub fn message(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self::Message {
            chat_id,
            text: text.into(),
            raw: Value::Null,
        }
    }

    pub fn callback(chat_id: ChatId, data: impl Into<String>) -> Self {
        Self::CallbackQuery {
            chat_id,
            data: data.into(),
            raw: Value::Null,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        match self {
            Self::Message { chat_id, .. } => *chat_id,
            Self::CallbackQuery { chat_id, .. } => *chat_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::CallbackQuery { .. } => "callback_query",
        }
    }

    pub fn as_message(&self) -> Option<MessagePayload> {
        match self {
            Self::Message { text, raw, .. } => Some(MessagePayload {
                text: text.clone(),
                raw: raw.clone(),
            }),
            Self::CallbackQuery { .. } => None,
        }
    }

    pub fn as_callback(&self) -> Option<CallbackPayload> {
        match self {
            Self::CallbackQuery { data, raw, .. } => Some(CallbackPayload {
                data: data.clone(),
                raw: raw.clone(),
            }),
            Self::Message { .. } => None,
        }
    }
}
