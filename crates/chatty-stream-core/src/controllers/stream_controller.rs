use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::models::{
    ConversationSelection, EventBus, NotificationSeverity, StreamChunk, StreamEvent, StreamKind,
    StreamRegistry, StreamRequest, StreamStatus,
};
use crate::services::{MessageStore, SteerError, StreamTransport};

/// How the last stream ended.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamOutcome {
    Completed,
    Aborted,
    Errored(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Streaming,
}

/// The single in-flight stream of this client.
struct ActiveStream {
    generation: u64,
    conversation_id: String,
    request: StreamRequest,
    accumulated: String,
    task: Option<JoinHandle<()>>,
}

impl ActiveStream {
    fn stoppable(&self) -> bool {
        StreamStatus::active(self.request.kind).stoppable
    }

    /// Agent responses are written to the conversation by the backend itself.
    fn saved_by_server(&self) -> bool {
        self.request.kind == StreamKind::Agent
    }
}

#[derive(Default)]
struct ControllerState {
    next_generation: u64,
    active: Option<ActiveStream>,
    last_outcome: Option<StreamOutcome>,
}

impl ControllerState {
    fn take_if_current(&mut self, generation: u64) -> Option<ActiveStream> {
        if self.active.as_ref()?.generation == generation {
            self.active.take()
        } else {
            None
        }
    }
}

/// Owns at most one SSE stream at a time.
///
/// Starting a stream aborts any previous one first. Every step that resumes
/// after an await re-checks the stream's generation, so a superseded task can
/// never touch the registry or the renderer.
pub struct ActiveStreamController {
    state: Mutex<ControllerState>,
    registry: Arc<StreamRegistry>,
    selection: Arc<ConversationSelection>,
    transport: Arc<dyn StreamTransport>,
    messages: Arc<dyn MessageStore>,
    events: EventBus,
}

impl ActiveStreamController {
    pub fn new(
        registry: Arc<StreamRegistry>,
        selection: Arc<ConversationSelection>,
        transport: Arc<dyn StreamTransport>,
        messages: Arc<dyn MessageStore>,
        events: EventBus,
    ) -> Self {
        Self {
            state: Mutex::new(ControllerState::default()),
            registry,
            selection,
            transport,
            messages,
            events,
        }
    }

    /// Start streaming `request`, aborting whatever stream was active.
    /// Returns the new stream's generation.
    pub fn start(self: &Arc<Self>, request: StreamRequest) -> u64 {
        let conversation_id = request.conversation_id.clone();
        let kind = request.kind;

        let (generation, previous) = {
            let mut state = self.state.lock();
            let previous = state.active.take();
            if previous.is_some() {
                state.last_outcome = Some(StreamOutcome::Aborted);
            }
            state.next_generation += 1;
            let generation = state.next_generation;
            state.active = Some(ActiveStream {
                generation,
                conversation_id: conversation_id.clone(),
                request: request.clone(),
                accumulated: String::new(),
                task: None,
            });
            (generation, previous)
        };

        if let Some(previous) = previous {
            // Restarting the same conversation keeps its registry entry alive
            let clear_registry = previous.conversation_id != conversation_id;
            self.end_aborted(previous, clear_registry);
        }

        self.registry.claim_local(&conversation_id);
        self.registry
            .set_status(&conversation_id, Some(StreamStatus::active(kind)));
        debug!(conv_id = %conversation_id, generation, ?kind, "Stream started");

        let task = tokio::spawn(self.clone().run_stream(generation, request));
        if let Some(active) = self.state.lock().active.as_mut()
            && active.generation == generation
        {
            active.task = Some(task);
        }

        generation
    }

    /// UI-facing start: stream `request` into `conversation_id`.
    pub fn send(self: &Arc<Self>, conversation_id: &str, mut request: StreamRequest) -> u64 {
        request.conversation_id = conversation_id.to_string();
        self.start(request)
    }

    /// Cancel the local transport of the active stream. The server-side task
    /// is left alone. Returns false when nothing was streaming.
    pub fn abort(&self) -> bool {
        match self.take_active() {
            Some(previous) => {
                self.end_aborted(previous, true);
                true
            }
            None => false,
        }
    }

    fn take_active(&self) -> Option<ActiveStream> {
        let mut state = self.state.lock();
        let previous = state.active.take();
        if previous.is_some() {
            state.last_outcome = Some(StreamOutcome::Aborted);
        }
        previous
    }

    /// Abort the active stream unless it belongs to `conversation_id`.
    pub fn abort_unless(&self, conversation_id: &str) -> bool {
        let previous = {
            let mut state = self.state.lock();
            let other = state
                .active
                .as_ref()
                .is_some_and(|active| active.conversation_id != conversation_id);
            if !other {
                return false;
            }
            state.last_outcome = Some(StreamOutcome::Aborted);
            state.active.take()
        };

        if let Some(previous) = previous {
            debug!(
                from = %previous.conversation_id,
                to = %conversation_id,
                "Aborting stream for conversation switch"
            );
            self.end_aborted(previous, true);
        }
        true
    }

    /// User stop: abort locally, then ask the server to halt a stoppable
    /// stream. The server request is best-effort.
    pub async fn stop(&self) -> bool {
        // The stream aborted here is the one the server is asked to stop
        let Some(previous) = self.take_active() else {
            return false;
        };
        let conversation_id = previous.conversation_id.clone();
        let stoppable = previous.stoppable();
        self.end_aborted(previous, true);

        if stoppable {
            match self.transport.stop(&conversation_id).await {
                Ok(true) => debug!(conv_id = %conversation_id, "Server acknowledged stop"),
                Ok(false) => debug!(conv_id = %conversation_id, "Server had no stream to stop"),
                Err(e) => {
                    warn!(conv_id = %conversation_id, error = ?e, "Stop request failed")
                }
            }
        }
        true
    }

    /// Inject guidance into the active agent stream: send it with the content
    /// accumulated so far, then restart the stream once the backend accepts.
    ///
    /// Returns the generation of the restarted stream. On failure the current
    /// stream keeps running and the guidance is handed back in the error.
    pub async fn steer(self: &Arc<Self>, guidance: &str) -> Result<u64, SteerError> {
        let snapshot = {
            let state = self.state.lock();
            match state.active.as_ref() {
                None => Err(SteerError::NotStreaming),
                Some(active) if !active.stoppable() => Err(SteerError::NotStoppable),
                Some(active) => Ok((
                    active.generation,
                    active.conversation_id.clone(),
                    active.accumulated.clone(),
                    active.request.clone(),
                )),
            }
        };
        let (generation, conversation_id, accumulated, request) = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let conversation_id = self.active_conversation();
                self.events.notify(
                    conversation_id.as_deref(),
                    NotificationSeverity::Warning,
                    e.to_string(),
                );
                return Err(e);
            }
        };

        let reply = self
            .transport
            .steer(&conversation_id, guidance, &accumulated)
            .await;

        let failure = match reply {
            Ok(ack) if ack.success => None,
            Ok(ack) => Some(SteerError::Rejected {
                message: ack
                    .message
                    .unwrap_or_else(|| "guidance was not accepted".to_string()),
                guidance: guidance.to_string(),
            }),
            Err(source) => Some(SteerError::Transport {
                source,
                guidance: guidance.to_string(),
            }),
        };

        let failure = failure.or_else(|| {
            let still_current = self
                .state
                .lock()
                .active
                .as_ref()
                .is_some_and(|active| active.generation == generation);
            (!still_current).then(|| SteerError::Superseded {
                guidance: guidance.to_string(),
            })
        });

        if let Some(e) = failure {
            warn!(conv_id = %conversation_id, error = %e, "Steering failed");
            self.events.publish(StreamEvent::SteerRejected {
                conversation_id,
                guidance: guidance.to_string(),
                message: e.to_string(),
            });
            return Err(e);
        }

        debug!(conv_id = %conversation_id, "Guidance accepted, restarting stream");
        Ok(self.start(request.steering_continuation(guidance, &accumulated)))
    }

    pub fn phase(&self) -> StreamPhase {
        if self.state.lock().active.is_some() {
            StreamPhase::Streaming
        } else {
            StreamPhase::Idle
        }
    }

    pub fn last_outcome(&self) -> Option<StreamOutcome> {
        self.state.lock().last_outcome.clone()
    }

    pub fn active_conversation(&self) -> Option<String> {
        self.state
            .lock()
            .active
            .as_ref()
            .map(|active| active.conversation_id.clone())
    }

    pub fn accumulated_content(&self) -> Option<String> {
        self.state
            .lock()
            .active
            .as_ref()
            .map(|active| active.accumulated.clone())
    }

    async fn run_stream(self: Arc<Self>, generation: u64, request: StreamRequest) {
        let mut stream = match self.transport.open(request).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(generation, error = ?e, "Failed to open stream");
                self.end_errored(generation, e.to_string());
                return;
            }
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(StreamChunk::Done) => {
                    self.end_completed(generation).await;
                    return;
                }
                Ok(StreamChunk::Error(message)) => {
                    warn!(generation, error = %message, "Server reported stream error");
                    self.end_errored(generation, message);
                    return;
                }
                Ok(chunk) => {
                    if !self.apply_chunk(generation, chunk) {
                        return;
                    }
                }
                Err(e) => {
                    error!(generation, error = ?e, "Stream transport failed");
                    self.end_errored(generation, e.to_string());
                    return;
                }
            }
        }

        // Body closed without a terminal event
        self.end_completed(generation).await;
    }

    /// Record a chunk and forward it to the renderer if its conversation is on
    /// screen. Returns false once this stream has been superseded.
    fn apply_chunk(&self, generation: u64, chunk: StreamChunk) -> bool {
        let mut state = self.state.lock();
        let Some(active) = state
            .active
            .as_mut()
            .filter(|active| active.generation == generation)
        else {
            return false;
        };

        if let Some(text) = chunk.accumulated_text() {
            active.accumulated.push_str(text);
        }
        // Published under both locks: an abort or a conversation switch is
        // ordered either before or after this chunk
        let conversation_id = active.conversation_id.clone();
        self.selection.with_selected(&conversation_id, || {
            self.events.publish(StreamEvent::Chunk {
                conversation_id: conversation_id.clone(),
                chunk,
            });
        });
        true
    }

    async fn end_completed(&self, generation: u64) {
        let flush = {
            let state = self.state.lock();
            state
                .active
                .as_ref()
                .filter(|active| active.generation == generation)
                .map(|active| {
                    (
                        active.conversation_id.clone(),
                        active.accumulated.clone(),
                        active.saved_by_server(),
                    )
                })
        };
        let Some((conversation_id, accumulated, saved_by_server)) = flush else {
            return;
        };

        if !saved_by_server
            && !accumulated.is_empty()
            && let Err(e) = self
                .messages
                .append_assistant_message(&conversation_id, accumulated)
                .await
        {
            warn!(conv_id = %conversation_id, error = ?e, "Failed to persist completed response");
            self.events.notify(
                Some(&conversation_id),
                NotificationSeverity::Warning,
                format!("Response finished but could not be saved: {e}"),
            );
        }

        let finished = {
            let mut state = self.state.lock();
            let finished = state.take_if_current(generation);
            if finished.is_some() {
                state.last_outcome = Some(StreamOutcome::Completed);
            }
            finished
        };
        if finished.is_none() {
            // Aborted while flushing; the abort already cleaned up
            return;
        }

        self.registry.release_local(&conversation_id);
        self.registry.set_status(&conversation_id, None);
        debug!(conv_id = %conversation_id, generation, "Stream completed");
        self.events.publish(StreamEvent::StreamEnded {
            conversation_id,
            outcome: StreamOutcome::Completed,
        });
    }

    fn end_errored(&self, generation: u64, message: String) {
        let finished = {
            let mut state = self.state.lock();
            let finished = state.take_if_current(generation);
            if finished.is_some() {
                state.last_outcome = Some(StreamOutcome::Errored(message.clone()));
            }
            finished
        };
        let Some(finished) = finished else {
            return;
        };

        let conversation_id = finished.conversation_id;
        self.registry.release_local(&conversation_id);
        self.registry.set_status(&conversation_id, None);
        self.events.publish(StreamEvent::StreamEnded {
            conversation_id: conversation_id.clone(),
            outcome: StreamOutcome::Errored(message.clone()),
        });
        self.events.notify(
            Some(&conversation_id),
            NotificationSeverity::Error,
            format!("Streaming failed: {message}"),
        );
    }

    fn end_aborted(&self, previous: ActiveStream, clear_registry: bool) {
        if let Some(task) = previous.task {
            task.abort();
        }
        if clear_registry {
            self.registry.release_local(&previous.conversation_id);
            self.registry.set_status(&previous.conversation_id, None);
        }
        debug!(
            conv_id = %previous.conversation_id,
            generation = previous.generation,
            discarded = previous.accumulated.len(),
            "Stream aborted"
        );
        self.events.publish(StreamEvent::StreamEnded {
            conversation_id: previous.conversation_id,
            outcome: StreamOutcome::Aborted,
        });
    }
}
