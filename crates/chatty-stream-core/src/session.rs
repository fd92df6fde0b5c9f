use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::controllers::{ActiveStreamController, ConversationSwitchCoordinator, SwitchOutcome};
use crate::models::{
    ConversationSelection, EventBus, StreamEvent, StreamRegistry, StreamRequest, StreamStatus,
};
use crate::services::{
    ConversationSource, MessageStore, PollingHandle, ServerStatusSync, SteerError,
    StreamStatusSource, StreamTransport, SyncGate, SyncReport,
};
use crate::settings::ClientSettings;

/// All reconciliation components of one client, wired to a single registry and
/// event bus.
pub struct ChatSession {
    settings: ClientSettings,
    registry: Arc<StreamRegistry>,
    events: EventBus,
    sync: Arc<ServerStatusSync>,
    controller: Arc<ActiveStreamController>,
    coordinator: ConversationSwitchCoordinator,
    polling: Option<PollingHandle>,
}

impl ChatSession {
    pub fn new(
        settings: ClientSettings,
        status_source: Arc<dyn StreamStatusSource>,
        transport: Arc<dyn StreamTransport>,
        conversations: Arc<dyn ConversationSource>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        let registry = Arc::new(StreamRegistry::new());
        let events = EventBus::new(settings.event_capacity);
        registry.subscribe(Arc::new(events.clone()));

        let selection = Arc::new(ConversationSelection::new());
        let sync = Arc::new(ServerStatusSync::new(
            registry.clone(),
            status_source,
            Arc::new(SyncGate::new()),
        ));
        let controller = Arc::new(ActiveStreamController::new(
            registry.clone(),
            selection.clone(),
            transport,
            messages,
            events.clone(),
        ));
        let coordinator = ConversationSwitchCoordinator::new(
            selection,
            controller.clone(),
            conversations,
            events.clone(),
        );

        Self {
            settings,
            registry,
            events,
            sync,
            controller,
            coordinator,
            polling: None,
        }
    }

    /// Build a session whose four ports are served by one backend client.
    pub fn with_backend<B>(settings: ClientSettings, backend: Arc<B>) -> Self
    where
        B: StreamStatusSource + StreamTransport + ConversationSource + MessageStore,
    {
        Self::new(
            settings,
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend,
        )
    }

    /// Reconcile once with the server, then keep polling in the background.
    /// Calling it again restarts the poller.
    pub async fn start(&mut self) -> SyncReport {
        let report = self.sync.refresh_all().await;
        info!(
            active = self.registry.active_ids().len(),
            poll_secs = self.settings.poll_interval_secs,
            "Stream status sync started"
        );
        self.polling = Some(self.sync.spawn_polling(self.settings.poll_interval()));
        report
    }

    pub fn shutdown(&mut self) {
        if let Some(polling) = self.polling.take() {
            polling.stop();
        }
        self.controller.abort();
    }

    pub async fn switch_to(&self, conversation_id: &str) -> SwitchOutcome {
        self.coordinator.switch_to(conversation_id).await
    }

    pub fn send(&self, conversation_id: &str, request: StreamRequest) -> u64 {
        self.controller.send(conversation_id, request)
    }

    pub fn abort(&self) -> bool {
        self.controller.abort()
    }

    pub async fn stop(&self) -> bool {
        self.controller.stop().await
    }

    pub async fn steer(&self, guidance: &str) -> Result<u64, SteerError> {
        self.controller.steer(guidance).await
    }

    pub async fn refresh(&self, conversation_id: &str) -> StreamStatus {
        self.sync.refresh_one(conversation_id).await
    }

    pub async fn refresh_all(&self) -> SyncReport {
        self.sync.refresh_all().await
    }

    pub fn is_streaming(&self, conversation_id: &str) -> bool {
        self.registry.is_streaming(conversation_id)
    }

    pub fn is_stoppable(&self, conversation_id: &str) -> bool {
        self.registry.is_stoppable(conversation_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    pub fn gate(&self) -> &Arc<SyncGate> {
        self.sync.gate()
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    pub fn controller(&self) -> &Arc<ActiveStreamController> {
        &self.controller
    }

    pub fn coordinator(&self) -> &ConversationSwitchCoordinator {
        &self.coordinator
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;
    use crate::controllers::StreamPhase;
    use crate::controllers::test_support::{FakeTransport, wait_for, wait_until};
    use crate::models::{StreamChunk, StreamKind};
    use crate::services::{BoxFuture, InMemoryMessageStore, TransportError};

    /// Server view that tests edit directly.
    #[derive(Default)]
    struct ServerView {
        streams: Mutex<HashMap<String, StreamStatus>>,
    }

    impl ServerView {
        fn set(&self, conversation_id: &str, status: Option<StreamStatus>) {
            let mut streams = self.streams.lock();
            match status {
                Some(status) => streams.insert(conversation_id.to_string(), status),
                None => streams.remove(conversation_id),
            };
        }
    }

    impl StreamStatusSource for ServerView {
        fn fetch_status(
            &self,
            conversation_id: &str,
        ) -> BoxFuture<'static, Result<StreamStatus, TransportError>> {
            let status = self
                .streams
                .lock()
                .get(conversation_id)
                .cloned()
                .unwrap_or_default();
            Box::pin(async move { Ok(status) })
        }

        fn fetch_all(
            &self,
        ) -> BoxFuture<'static, Result<HashMap<String, StreamStatus>, TransportError>> {
            let streams = self.streams.lock().clone();
            Box::pin(async move { Ok(streams) })
        }
    }

    fn session() -> (ChatSession, Arc<ServerView>, Arc<FakeTransport>, InMemoryMessageStore) {
        let server = Arc::new(ServerView::default());
        let transport = FakeTransport::new();
        let store = InMemoryMessageStore::new();
        let session = ChatSession::new(
            ClientSettings::default(),
            server.clone(),
            transport.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        );
        (session, server, transport, store)
    }

    #[tokio::test]
    async fn test_startup_adopts_other_clients_streams() {
        let (mut session, server, _, _) = session();
        let mut rx = session.subscribe();
        server.set("conv-x", Some(StreamStatus::active(StreamKind::Agent)));

        let report = session.start().await;

        assert_eq!(report.updated, 1);
        assert!(session.is_streaming("conv-x"));
        assert!(session.is_stoppable("conv-x"));
        wait_for(&mut rx, |e| matches!(e, StreamEvent::TaskAdded { .. })).await;
    }

    #[tokio::test]
    async fn test_task_completion_fires_once_after_remote_stream_ends() {
        let (session, server, _, _) = session();
        let mut rx = session.subscribe();
        server.set("conv-x", Some(StreamStatus::active(StreamKind::Agent)));
        session.refresh_all().await;

        server.set("conv-x", None);
        let report = session.refresh_all().await;
        assert_eq!(report.cleared, 1);
        session.refresh_all().await;

        wait_for(&mut rx, |e| matches!(e, StreamEvent::TaskCompleted { .. })).await;
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, StreamEvent::TaskCompleted { .. }));
        }
        assert!(!session.is_streaming("conv-x"));
    }

    #[tokio::test]
    async fn test_poll_never_clears_own_stream() {
        let (session, _server, transport, store) = session();
        session.switch_to("conv-1").await;
        session.send(
            "conv-1",
            StreamRequest::new("", StreamKind::Agent).with_user_message("go"),
        );
        wait_until(|| transport.open_count() == 1).await;

        // Server has not registered the stream yet
        let report = session.refresh_all().await;
        assert_eq!(report.cleared, 0);
        assert_eq!(session.refresh("conv-1").await, StreamStatus::active(StreamKind::Agent));
        assert!(session.is_streaming("conv-1"));

        let tx = transport.sender(0);
        tx.send(Ok(StreamChunk::Text("hi".into()))).unwrap();
        tx.send(Ok(StreamChunk::Done)).unwrap();
        wait_until(|| session.controller().phase() == StreamPhase::Idle).await;

        assert!(!session.is_streaming("conv-1"));
        // Agent replies are stored by the backend, not re-posted
        assert!(store.messages("conv-1").is_empty());
    }

    #[tokio::test]
    async fn test_gated_sync_makes_no_changes() {
        let (session, server, _, _) = session();
        server.set("conv-x", Some(StreamStatus::active(StreamKind::Normal)));
        session.gate().set_visible(false);

        assert!(session.refresh_all().await.skipped);
        assert!(!session.is_streaming("conv-x"));

        session.gate().set_visible(true);
        {
            let _editing = session.gate().begin_local_edit();
            assert!(session.refresh_all().await.skipped);
        }
        assert_eq!(session.refresh_all().await.updated, 1);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_active_stream() {
        let (mut session, _, _, _) = session();
        session.start().await;
        session.send("conv-1", StreamRequest::new("", StreamKind::Normal));

        session.shutdown();

        assert_eq!(session.controller().phase(), StreamPhase::Idle);
        assert!(!session.is_streaming("conv-1"));
    }
}
