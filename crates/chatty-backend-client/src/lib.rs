//! HTTP client for the chatty backend.
//!
//! [`BackendClient`] implements every port of `chatty-stream-core`, so one
//! instance can back a whole [`chatty_stream_core::ChatSession`].

pub mod client;
pub mod error;
pub mod sse;

pub use client::BackendClient;
pub use error::ClientError;
pub use sse::{SseDecoder, decode_chunk_stream};
