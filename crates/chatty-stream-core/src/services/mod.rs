pub mod error;
pub mod error_collector_layer;
pub mod message_store;
pub mod ports;
pub mod status_sync;

pub use error::{SteerError, TransportError};
pub use error_collector_layer::ErrorCollectorLayer;
pub use message_store::InMemoryMessageStore;
pub use ports::{
    BoxFuture, ChunkStream, ConversationSource, MessageStore, SteerAck, StreamStatusSource,
    StreamTransport,
};
pub use status_sync::{LocalEditGuard, PollingHandle, ServerStatusSync, SyncGate, SyncReport};
