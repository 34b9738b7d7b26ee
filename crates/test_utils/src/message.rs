//! A message handler that records diagnostics.

use fetchbridge_api::message::*;
use std::sync::{Arc, Mutex};

/// A [MessageHandler] recording every message. Messages are also
/// forwarded to `tracing`.
#[derive(Debug, Default)]
pub struct RecordingMessageHandler {
    messages: Mutex<Vec<(MessageType, String)>>,
}

impl RecordingMessageHandler {
    /// Construct a new handler.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All recorded messages, in order.
    pub fn messages(&self) -> Vec<(MessageType, String)> {
        self.messages.lock().unwrap().clone()
    }

    /// Whether a message of the given type containing `needle` was
    /// recorded.
    pub fn contains(&self, message_type: MessageType, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|(t, m)| *t == message_type && m.contains(needle))
    }
}

impl MessageHandler for RecordingMessageHandler {
    fn message(&self, message_type: MessageType, message: &str) {
        tracing::info!(%message_type, "{message}");
        self.messages
            .lock()
            .unwrap()
            .push((message_type, message.to_string()));
    }
}
