use tokio::sync::broadcast;
use tracing::debug;

use super::conversation_message::ConversationMessage;
use super::stream_chunk::StreamChunk;
use super::stream_registry::StreamStatusObserver;
use super::stream_status::StreamStatus;
use crate::controllers::StreamOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationSeverity {
    Info,
    Warning,
    Error,
}

/// Events published to the UI renderer. Each variant names its conversation so
/// subscribers can filter.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    StatusChanged {
        conversation_id: String,
        status: StreamStatus,
    },
    TaskAdded {
        conversation_id: String,
    },
    TaskCompleted {
        conversation_id: String,
    },
    /// Emitted before the load starts so the renderer can drop stale content.
    ConversationSelected {
        conversation_id: String,
        request_id: u64,
    },
    ConversationLoaded {
        conversation_id: String,
        request_id: u64,
        messages: Vec<ConversationMessage>,
    },
    /// Only published while the stream's conversation is the selected one.
    Chunk {
        conversation_id: String,
        chunk: StreamChunk,
    },
    StreamEnded {
        conversation_id: String,
        outcome: StreamOutcome,
    },
    Notification {
        conversation_id: Option<String>,
        severity: NotificationSeverity,
        message: String,
    },
    /// The backend declined the guidance. The text is handed back so the user
    /// can retry it.
    SteerRejected {
        conversation_id: String,
        guidance: String,
        message: String,
    },
}

/// Broadcast channel between the reconciliation components and the renderer.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StreamEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: StreamEvent) {
        // No subscribers is fine: nobody is rendering yet
        if self.sender.send(event).is_err() {
            debug!("Stream event dropped, no subscribers");
        }
    }

    pub fn notify(
        &self,
        conversation_id: Option<&str>,
        severity: NotificationSeverity,
        message: impl Into<String>,
    ) {
        self.publish(StreamEvent::Notification {
            conversation_id: conversation_id.map(str::to_string),
            severity,
            message: message.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl StreamStatusObserver for EventBus {
    fn on_status_change(&self, conversation_id: &str, status: &StreamStatus) {
        self.publish(StreamEvent::StatusChanged {
            conversation_id: conversation_id.to_string(),
            status: status.clone(),
        });
    }

    fn on_task_added(&self, conversation_id: &str) {
        self.publish(StreamEvent::TaskAdded {
            conversation_id: conversation_id.to_string(),
        });
    }

    fn on_task_completed(&self, conversation_id: &str) {
        self.publish(StreamEvent::TaskCompleted {
            conversation_id: conversation_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StreamKind, StreamRegistry};
    use std::sync::Arc;

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.notify(None, NotificationSeverity::Info, "nobody listening");
    }

    #[test]
    fn test_registry_changes_reach_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let registry = StreamRegistry::new();
        registry.subscribe(Arc::new(bus.clone()));

        registry.set_status("conv-1", Some(StreamStatus::active(StreamKind::Agent)));

        match rx.try_recv().unwrap() {
            StreamEvent::StatusChanged {
                conversation_id,
                status,
            } => {
                assert_eq!(conversation_id, "conv-1");
                assert!(status.stoppable);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            StreamEvent::TaskAdded { conversation_id } if conversation_id == "conv-1"
        ));
    }
}
