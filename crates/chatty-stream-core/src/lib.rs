//! Streaming-session reconciliation for chatty clients.
//!
//! Tracks which conversations are receiving server-sent events, owns the single
//! in-flight stream of the current client, and fences conversation loads so that a
//! late response can never repaint a view the user has already left.

pub mod controllers;
pub mod models;
pub mod services;
pub mod session;
pub mod settings;

pub use controllers::{
    ActiveStreamController, ConversationSwitchCoordinator, RenderedConversation, StreamOutcome,
    StreamPhase, SwitchOutcome,
};
pub use models::{
    ConversationMessage, ConversationSelection, EventBus, LoadRequest, NotificationSeverity,
    StreamChunk, StreamEvent, StreamKind, StreamRegistry, StreamRequest, StreamStatus,
    StreamStatusObserver,
};
pub use services::{
    ConversationSource, MessageStore, ServerStatusSync, SteerAck, SteerError, StreamStatusSource,
    StreamTransport, SyncGate, SyncReport, TransportError,
};
pub use session::ChatSession;
pub use settings::ClientSettings;
