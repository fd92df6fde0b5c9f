use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::stream_status::StreamKind;

/// Body of `POST stream/start`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub conversation_id: String,
    #[serde(rename = "type")]
    pub kind: StreamKind,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<Vec<u32>>,
}

impl StreamRequest {
    pub fn new(conversation_id: impl Into<String>, kind: StreamKind) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            kind,
            messages: Vec::new(),
            model: None,
            system_prompt: None,
            branch: None,
        }
    }

    /// Append a plain user message.
    pub fn with_user_message(mut self, text: impl Into<String>) -> Self {
        self.messages
            .push(json!({ "role": "user", "content": text.into() }));
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Request that resumes this conversation after a steer: the partial
    /// assistant output so far, followed by the user's guidance.
    pub fn steering_continuation(&self, guidance: &str, accumulated: &str) -> Self {
        let mut next = self.clone();
        if !accumulated.is_empty() {
            next.messages
                .push(json!({ "role": "assistant", "content": accumulated }));
        }
        next.messages
            .push(json!({ "role": "user", "content": guidance }));
        next
    }
}
