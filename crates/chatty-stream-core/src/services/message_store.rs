use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::TransportError;
use super::ports::{BoxFuture, ConversationSource, MessageStore};
use crate::models::ConversationMessage;

/// In-memory message store.
/// Useful for testing and for running without a persistence backend.
#[derive(Clone, Default)]
pub struct InMemoryMessageStore {
    conversations: Arc<Mutex<HashMap<String, Vec<ConversationMessage>>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conversation_id: &str, messages: Vec<ConversationMessage>) {
        self.conversations
            .lock()
            .insert(conversation_id.to_string(), messages);
    }

    pub fn messages(&self, conversation_id: &str) -> Vec<ConversationMessage> {
        self.conversations
            .lock()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn append_assistant_message(
        &self,
        conversation_id: &str,
        content: String,
    ) -> BoxFuture<'static, Result<(), TransportError>> {
        let conversations = self.conversations.clone();
        let conversation_id = conversation_id.to_string();

        Box::pin(async move {
            conversations
                .lock()
                .entry(conversation_id)
                .or_default()
                .push(ConversationMessage::assistant(content));
            Ok(())
        })
    }
}

impl ConversationSource for InMemoryMessageStore {
    fn load_messages(
        &self,
        conversation_id: &str,
    ) -> BoxFuture<'static, Result<Vec<ConversationMessage>, TransportError>> {
        let messages = self.messages(conversation_id);
        Box::pin(async move { Ok(messages) })
    }
}
