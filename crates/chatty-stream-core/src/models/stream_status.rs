use serde::{Deserialize, Serialize};

/// Kind of stream, which determines whether it can be stopped or steered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Regular chat completion. Not stoppable.
    Normal,
    /// Agent task. Stoppable and steerable.
    Agent,
}

/// Streaming status of a single conversation, in the backend's wire shape.
///
/// The default value (`streaming: false`, no kind, not stoppable) is what callers
/// get for any conversation the registry has no entry for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStatus {
    #[serde(default)]
    pub streaming: bool,
    #[serde(rename = "type", default)]
    pub kind: Option<StreamKind>,
    #[serde(default)]
    pub stoppable: bool,
}

impl StreamStatus {
    /// Status of a stream this client just opened.
    pub fn active(kind: StreamKind) -> Self {
        Self {
            streaming: true,
            kind: Some(kind),
            stoppable: kind == StreamKind::Agent,
        }
    }

    pub fn is_agent(&self) -> bool {
        self.kind == Some(StreamKind::Agent)
    }

    /// True for a streaming agent entry, the only kind that counts as a background task.
    pub fn is_agent_task(&self) -> bool {
        self.streaming && self.is_agent()
    }
}
