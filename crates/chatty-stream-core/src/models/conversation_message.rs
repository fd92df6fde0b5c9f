use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persisted message as returned by `GET conversations/{id}/messages`.
///
/// `content` is either a plain string or a list of content blocks, so it is
/// kept as raw JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: String,
    #[serde(default)]
    pub content: Value,
}

impl ConversationMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: "assistant".to_string(),
            content: Value::String(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: "user".to_string(),
            content: Value::String(content.into()),
        }
    }

    /// Concatenated text of the message, flattening `text` blocks.
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            Value::Array(blocks) => blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(""),
            _ => String::new(),
        }
    }
}
