use thiserror::Error;

/// Failure talking to the backend. Caught at the sync/controller boundary and
/// never handed to the renderer as-is.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("backend returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode backend response: {0}")]
    Decode(String),

    #[error("stream closed")]
    Closed,
}

impl From<serde_json::Error> for TransportError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

/// Why a steering request did not go through. Every variant that reached the
/// point of sending keeps the guidance text for a manual retry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SteerError {
    #[error("no stream is active")]
    NotStreaming,

    #[error("the active stream cannot be steered")]
    NotStoppable,

    #[error("backend declined guidance: {message}")]
    Rejected { message: String, guidance: String },

    #[error("steering request failed: {source}")]
    Transport {
        source: TransportError,
        guidance: String,
    },

    #[error("stream ended before guidance was applied")]
    Superseded { guidance: String },
}

impl SteerError {
    /// Guidance to put back into the input box, if any was sent.
    pub fn guidance(&self) -> Option<&str> {
        match self {
            Self::Rejected { guidance, .. }
            | Self::Transport { guidance, .. }
            | Self::Superseded { guidance } => Some(guidance),
            Self::NotStreaming | Self::NotStoppable => None,
        }
    }
}
