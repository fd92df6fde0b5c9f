use chatty_stream_core::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid JSON from backend: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<ClientError> for TransportError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Status { status, body } => TransportError::Http { status, body },
            ClientError::Decode(e) => TransportError::Decode(e.to_string()),
            ClientError::Request(e) if e.is_decode() => TransportError::Decode(e.to_string()),
            other => TransportError::Network(other.to_string()),
        }
    }
}

/// Keep error bodies short enough for a notification.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX_CHARS: usize = 512;
    let body = body.trim();
    if body.chars().count() <= MAX_CHARS {
        return body.to_string();
    }
    let truncated: String = body.chars().take(MAX_CHARS).collect();
    format!("{truncated}...")
}
