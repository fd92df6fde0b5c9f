use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::stream_controller::ActiveStreamController;
use crate::models::{
    ConversationMessage, ConversationSelection, EventBus, NotificationSeverity, StreamEvent,
};
use crate::services::ConversationSource;

/// Conversation content that made it to the screen.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedConversation {
    pub conversation_id: String,
    pub request_id: u64,
    pub messages: Vec<ConversationMessage>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SwitchOutcome {
    Loaded { message_count: usize },
    /// A newer switch was requested while this one was loading.
    Superseded,
    Failed(String),
}

/// Serializes conversation switches. Loads may finish in any order; only the
/// one matching the latest request is applied.
pub struct ConversationSwitchCoordinator {
    selection: Arc<ConversationSelection>,
    controller: Arc<ActiveStreamController>,
    source: Arc<dyn ConversationSource>,
    events: EventBus,
    rendered: Mutex<Option<RenderedConversation>>,
}

impl ConversationSwitchCoordinator {
    pub fn new(
        selection: Arc<ConversationSelection>,
        controller: Arc<ActiveStreamController>,
        source: Arc<dyn ConversationSource>,
        events: EventBus,
    ) -> Self {
        Self {
            selection,
            controller,
            source,
            events,
            rendered: Mutex::new(None),
        }
    }

    pub async fn switch_to(&self, conversation_id: &str) -> SwitchOutcome {
        let request = self.selection.select_with(conversation_id, |request| {
            self.events.publish(StreamEvent::ConversationSelected {
                conversation_id: conversation_id.to_string(),
                request_id: request.request_id,
            });
        });

        // A stream of the target conversation keeps running
        self.controller.abort_unless(conversation_id);

        let result = self.source.load_messages(conversation_id).await;

        // Applied under the selection lock, so no later selection can be
        // announced between the check and the publish
        let applied = self.selection.apply_if_current(&request, || match result {
            Ok(messages) => {
                let message_count = messages.len();
                *self.rendered.lock() = Some(RenderedConversation {
                    conversation_id: conversation_id.to_string(),
                    request_id: request.request_id,
                    messages: messages.clone(),
                });
                self.events.publish(StreamEvent::ConversationLoaded {
                    conversation_id: conversation_id.to_string(),
                    request_id: request.request_id,
                    messages,
                });
                SwitchOutcome::Loaded { message_count }
            }
            Err(e) => {
                warn!(conv_id = %conversation_id, error = ?e, "Failed to load conversation");
                self.events.notify(
                    Some(conversation_id),
                    NotificationSeverity::Error,
                    format!("Could not load conversation: {e}"),
                );
                SwitchOutcome::Failed(e.to_string())
            }
        });

        applied.unwrap_or_else(|| {
            debug!(
                conv_id = %conversation_id,
                request_id = request.request_id,
                "Discarding stale conversation load"
            );
            SwitchOutcome::Superseded
        })
    }

    pub fn selected(&self) -> Option<String> {
        self.selection.selected()
    }

    pub fn rendered(&self) -> Option<RenderedConversation> {
        self.rendered.lock().clone()
    }
}
