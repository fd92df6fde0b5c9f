use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::stream_status::StreamStatus;

/// Receives registry changes. Injected at construction instead of being looked
/// up at call time.
pub trait StreamStatusObserver: Send + Sync {
    /// Called on every `set_status`, including redundant ones.
    fn on_status_change(&self, conversation_id: &str, status: &StreamStatus);

    /// An agent task started streaming for this conversation.
    fn on_task_added(&self, _conversation_id: &str) {}

    /// An agent task that was streaming for this conversation has ended.
    fn on_task_completed(&self, _conversation_id: &str) {}
}

#[derive(Default)]
struct RegistryState {
    statuses: HashMap<String, StreamStatus>,
    /// Conversations whose stream this client currently owns. Server sync may
    /// never clear these.
    local_claims: HashSet<String>,
}

/// Transition computed under the lock and reported after it is released.
struct Transition {
    status: StreamStatus,
    task_added: bool,
    task_completed: bool,
}

impl Transition {
    fn between(previous: Option<&StreamStatus>, next: Option<&StreamStatus>) -> Self {
        let was_task = previous.is_some_and(StreamStatus::is_agent_task);
        let is_task = next.is_some_and(StreamStatus::is_agent_task);
        Self {
            status: next.cloned().unwrap_or_default(),
            task_added: is_task && !was_task,
            task_completed: was_task && next.is_none(),
        }
    }
}

/// In-memory map from conversation id to stream status.
///
/// Absence of an entry means "not streaming". Entries only ever hold
/// `streaming: true` statuses; setting a non-streaming status clears the entry.
pub struct StreamRegistry {
    state: Mutex<RegistryState>,
    observers: RwLock<Vec<Arc<dyn StreamStatusObserver>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn StreamStatusObserver>) {
        self.observers.write().push(observer);
    }

    /// Upsert (`Some` with `streaming: true`) or clear (`None` or a non-streaming
    /// status) the entry for a conversation, then notify observers.
    pub fn set_status(&self, conversation_id: &str, status: Option<StreamStatus>) {
        let next = status.filter(|s| s.streaming);
        let transition = {
            let mut state = self.state.lock();
            let previous = match &next {
                Some(status) => state
                    .statuses
                    .insert(conversation_id.to_string(), status.clone()),
                None => state.statuses.remove(conversation_id),
            };
            Transition::between(previous.as_ref(), next.as_ref())
        };
        self.notify(conversation_id, transition);
    }

    /// Clear the entry unless this client owns the stream. Returns whether an
    /// entry was actually removed.
    pub fn clear_unless_claimed(&self, conversation_id: &str) -> bool {
        let transition = {
            let mut state = self.state.lock();
            if state.local_claims.contains(conversation_id) {
                debug!(conv_id = %conversation_id, "Keeping locally owned stream");
                return false;
            }
            match state.statuses.remove(conversation_id) {
                Some(previous) => Transition::between(Some(&previous), None),
                None => return false,
            }
        };
        self.notify(conversation_id, transition);
        true
    }

    /// Status for a conversation; the default (not streaming) when absent.
    pub fn get_status(&self, conversation_id: &str) -> StreamStatus {
        self.state
            .lock()
            .statuses
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_streaming(&self, conversation_id: &str) -> bool {
        self.state.lock().statuses.contains_key(conversation_id)
    }

    pub fn is_stoppable(&self, conversation_id: &str) -> bool {
        self.state
            .lock()
            .statuses
            .get(conversation_id)
            .is_some_and(|s| s.stoppable)
    }

    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().statuses.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self) -> HashMap<String, StreamStatus> {
        self.state.lock().statuses.clone()
    }

    /// Mark a conversation's stream as owned by this client.
    pub fn claim_local(&self, conversation_id: &str) {
        self.state
            .lock()
            .local_claims
            .insert(conversation_id.to_string());
    }

    pub fn release_local(&self, conversation_id: &str) {
        self.state.lock().local_claims.remove(conversation_id);
    }

    pub fn is_locally_owned(&self, conversation_id: &str) -> bool {
        self.state.lock().local_claims.contains(conversation_id)
    }

    fn notify(&self, conversation_id: &str, transition: Transition) {
        let observers = self.observers.read().clone();
        for observer in &observers {
            observer.on_status_change(conversation_id, &transition.status);
            if transition.task_added {
                observer.on_task_added(conversation_id);
            }
            if transition.task_completed {
                observer.on_task_completed(conversation_id);
            }
        }
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
