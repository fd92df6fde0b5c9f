pub mod conversation_message;
pub mod error_store;
pub mod event_bus;
pub mod selection;
pub mod stream_chunk;
pub mod stream_registry;
pub mod stream_request;
pub mod stream_status;

pub use conversation_message::ConversationMessage;
pub use error_store::{ErrorEntry, ErrorLevel, ErrorStore};
pub use event_bus::{EventBus, NotificationSeverity, StreamEvent};
pub use selection::{ConversationSelection, LoadRequest};
pub use stream_chunk::StreamChunk;
pub use stream_registry::{StreamRegistry, StreamStatusObserver};
pub use stream_request::StreamRequest;
pub use stream_status::{StreamKind, StreamStatus};
