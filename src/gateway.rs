//! Outbound side of a chat: sending views back to the user. Kept as a
//! trait so the machine never hardcodes a transport, the same way the
//! teacher keeps telegram calls behind `TgClient` rather than inlining
//! bot-api calls into handlers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::state_machine::types::ChatId;
use crate::util::error::Result;

/// A single button row/grid sent alongside a rendered view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<KeyboardButton>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl Keyboard {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single_row(buttons: impl IntoIterator<Item = KeyboardButton>) -> Self {
        Self {
            rows: vec![buttons.into_iter().collect()],
        }
    }
}

impl KeyboardButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Send side of a chat transport. A real deployment implements this
/// against whatever bot API it's fronting; tests and the demo binary
/// use [`RecordingGateway`].
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<()>;
}

/// A single message sent through a [`RecordingGateway`], kept for
/// assertions in tests and for the demo binary's console output.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

/// In-memory gateway that records every send instead of delivering it
/// anywhere. Mirrors the way the teacher substitutes a mock backend in
/// `#[cfg(test)]` builds rather than hitting a live API.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<SentMessage> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<()> {
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            text: text.to_owned(),
            keyboard,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sends_in_order() {
        let gateway = RecordingGateway::new();
        gateway.send_message(1, "hi", None).await.unwrap();
        gateway
            .send_message(1, "again", Some(Keyboard::empty()))
            .await
            .unwrap();

        let sent = gateway.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].text, "hi");
        assert_eq!(sent[1].keyboard, Some(Keyboard::empty()));
        assert_eq!(gateway.last().unwrap().text, "again");
    }

    #[tokio::test]
    async fn clear_empties_the_log() {
        let gateway = RecordingGateway::new();
        gateway.send_message(1, "hi", None).await.unwrap();
        gateway.clear();
        assert!(gateway.sent().is_empty());
        assert!(gateway.last().is_none());
    }
}
