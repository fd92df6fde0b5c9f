//! In-memory fakes of the backend ports for controller and coordinator tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::models::{ConversationMessage, StreamChunk, StreamEvent, StreamRequest};
use crate::services::{
    BoxFuture, ChunkStream, ConversationSource, MessageStore, SteerAck, StreamTransport,
    TransportError,
};

pub type ChunkSender = mpsc::UnboundedSender<Result<StreamChunk, TransportError>>;

/// Transport whose streams are fed by the test through channels.
#[derive(Default)]
pub struct FakeTransport {
    pub opened: Mutex<Vec<StreamRequest>>,
    senders: Mutex<Vec<ChunkSender>>,
    pub stops: Mutex<Vec<String>>,
    pub steers: Mutex<Vec<(String, String, String)>>,
    pub steer_reply: Mutex<Option<Result<SteerAck, TransportError>>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sender feeding the n-th opened stream.
    pub fn sender(&self, index: usize) -> ChunkSender {
        self.senders.lock()[index].clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn steer_count(&self) -> usize {
        self.steers.lock().len()
    }

    /// Drop the fake's copies of the senders so streams end once the test's
    /// own senders are gone.
    pub fn senders_clear(&self) {
        self.senders.lock().clear();
    }
}

impl StreamTransport for FakeTransport {
    fn open(
        &self,
        request: StreamRequest,
    ) -> BoxFuture<'static, Result<ChunkStream, TransportError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.opened.lock().push(request);
        self.senders.lock().push(tx);

        Box::pin(async move {
            let stream = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed();
            Ok(stream)
        })
    }

    fn stop(&self, conversation_id: &str) -> BoxFuture<'static, Result<bool, TransportError>> {
        self.stops.lock().push(conversation_id.to_string());
        Box::pin(async { Ok(true) })
    }

    fn steer(
        &self,
        conversation_id: &str,
        guidance: &str,
        accumulated_content: &str,
    ) -> BoxFuture<'static, Result<SteerAck, TransportError>> {
        self.steers.lock().push((
            conversation_id.to_string(),
            guidance.to_string(),
            accumulated_content.to_string(),
        ));
        let reply = self.steer_reply.lock().clone().unwrap_or(Ok(SteerAck {
            success: true,
            message: None,
        }));
        Box::pin(async move { reply })
    }
}

/// Conversation source whose loads complete only when the test releases them.
#[derive(Default)]
pub struct GatedConversationSource {
    pending: Mutex<HashMap<String, Vec<oneshot::Sender<Result<Vec<ConversationMessage>, TransportError>>>>>,
}

impl GatedConversationSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Complete the oldest pending load of a conversation.
    pub fn release(&self, conversation_id: &str, result: Result<Vec<ConversationMessage>, TransportError>) {
        let sender = self
            .pending
            .lock()
            .get_mut(conversation_id)
            .filter(|senders| !senders.is_empty())
            .map(|senders| senders.remove(0));
        if let Some(sender) = sender {
            let _ = sender.send(result);
        }
    }

    pub fn pending_count(&self, conversation_id: &str) -> usize {
        self.pending
            .lock()
            .get(conversation_id)
            .map_or(0, Vec::len)
    }
}

impl ConversationSource for GatedConversationSource {
    fn load_messages(
        &self,
        conversation_id: &str,
    ) -> BoxFuture<'static, Result<Vec<ConversationMessage>, TransportError>> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .entry(conversation_id.to_string())
            .or_default()
            .push(tx);
        Box::pin(async move { rx.await.unwrap_or(Err(TransportError::Closed)) })
    }
}

/// Message store that always fails.
pub struct FailingMessageStore;

impl MessageStore for FailingMessageStore {
    fn append_assistant_message(
        &self,
        _conversation_id: &str,
        _content: String,
    ) -> BoxFuture<'static, Result<(), TransportError>> {
        Box::pin(async { Err(TransportError::Network("store offline".into())) })
    }
}

/// Wait for the first event matching `predicate`, skipping others.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<StreamEvent>, mut predicate: F) -> StreamEvent
where
    F: FnMut(&StreamEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub fn message(text: &str) -> ConversationMessage {
    ConversationMessage::assistant(text)
}

/// Poll `condition` until it holds.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}
