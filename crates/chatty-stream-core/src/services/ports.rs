use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::error::TransportError;
use crate::models::{ConversationMessage, StreamChunk, StreamRequest, StreamStatus};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Chunks of one open stream, in arrival order.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, TransportError>>;

/// Backend reply to stop and steer requests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SteerAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Authoritative stream status, as the server sees it.
pub trait StreamStatusSource: Send + Sync + 'static {
    fn fetch_status(
        &self,
        conversation_id: &str,
    ) -> BoxFuture<'static, Result<StreamStatus, TransportError>>;

    /// Every stream the server currently considers active.
    fn fetch_all(&self)
    -> BoxFuture<'static, Result<HashMap<String, StreamStatus>, TransportError>>;
}

/// Opens, stops and steers SSE streams.
pub trait StreamTransport: Send + Sync + 'static {
    fn open(&self, request: StreamRequest)
    -> BoxFuture<'static, Result<ChunkStream, TransportError>>;

    /// Ask the server to halt a stoppable stream. Advisory only.
    fn stop(&self, conversation_id: &str) -> BoxFuture<'static, Result<bool, TransportError>>;

    fn steer(
        &self,
        conversation_id: &str,
        guidance: &str,
        accumulated_content: &str,
    ) -> BoxFuture<'static, Result<SteerAck, TransportError>>;
}

/// Persisted messages of a conversation.
pub trait ConversationSource: Send + Sync + 'static {
    fn load_messages(
        &self,
        conversation_id: &str,
    ) -> BoxFuture<'static, Result<Vec<ConversationMessage>, TransportError>>;
}

/// Where a completed stream's text is flushed to.
pub trait MessageStore: Send + Sync + 'static {
    fn append_assistant_message(
        &self,
        conversation_id: &str,
        content: String,
    ) -> BoxFuture<'static, Result<(), TransportError>>;
}
