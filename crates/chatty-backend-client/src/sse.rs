use std::fmt::Display;

use bytes::Bytes;
use chatty_stream_core::services::ChunkStream;
use chatty_stream_core::{StreamChunk, TransportError};
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

/// Incremental `text/event-stream` decoder.
///
/// Feed it raw body bytes as they arrive. It yields the `data` payload of every
/// complete event, with multi-line data joined by `\n`. Comments and fields
/// other than `data` are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line_buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.line_buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline_index) = self.line_buffer.iter().position(|byte| *byte == b'\n') {
            let mut line = self.line_buffer.drain(..=newline_index).collect::<Vec<_>>();
            line.pop();
            if matches!(line.last(), Some(b'\r')) {
                line.pop();
            }
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush at end of body. An unterminated final event is still delivered.
    pub fn finish(&mut self) -> Option<String> {
        if !self.line_buffer.is_empty() {
            let line = std::mem::take(&mut self.line_buffer);
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &[u8]) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(b":") {
            return None;
        }

        let line = String::from_utf8_lossy(line);
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };
        if field == "data" {
            self.data_lines.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(data)
    }
}

fn decode_frame(payload: &str) -> Option<StreamChunk> {
    if payload.trim().is_empty() {
        return None;
    }
    match StreamChunk::from_json(payload) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            warn!(error = %e, "Skipping malformed stream frame");
            None
        }
    }
}

/// Turn a response body into a stream of chunks. A body read error is yielded
/// once and ends the stream.
pub fn decode_chunk_stream<S, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::new();

        while let Some(next) = body.next().await {
            match next {
                Ok(bytes) => {
                    for payload in decoder.push(&bytes) {
                        if let Some(chunk) = decode_frame(&payload) {
                            yield Ok(chunk);
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Stream body read failed");
                    yield Err(TransportError::Network(e.to_string()));
                    return;
                }
            }
        }

        if let Some(chunk) = decoder.finish().as_deref().and_then(decode_frame) {
            yield Ok(chunk);
        }
        debug!("Stream body closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn test_events_split_across_reads() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"te").is_empty());
        assert!(decoder.push(b"xt\",\"content\":\"hi\"}\n").is_empty());
        let events = decoder.push(b"\ndata: {\"type\":\"done\"}\n\n");
        assert_eq!(
            events,
            vec![
                r#"{"type":"text","content":"hi"}"#.to_string(),
                r#"{"type":"done"}"#.to_string()
            ]
        );
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\r\nevent: message\r\ndata: line one\r\ndata:line two\r\n\r\n");
        assert_eq!(events, vec!["line one\nline two".to_string()]);
    }

    #[test]
    fn test_finish_delivers_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert_eq!(decoder.finish(), None);
    }

    #[tokio::test]
    async fn test_decode_chunk_stream_skips_bad_frames() {
        let body = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(
                b"data: {\"type\":\"text\",\"content\":\"a\"}\n\ndata: not json\n\n",
            )),
            Ok(Bytes::from_static(b"data: {\"type\":\"done\"}\n\n")),
        ]);

        let chunks: Vec<_> = decode_chunk_stream(body).collect().await;

        assert_eq!(
            chunks,
            vec![Ok(StreamChunk::Text("a".into())), Ok(StreamChunk::Done)]
        );
    }

    #[tokio::test]
    async fn test_read_error_ends_stream() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"text\",\"content\":\"a\"}\n\n")),
            Err("connection reset"),
            Ok(Bytes::from_static(b"data: {\"type\":\"done\"}\n\n")),
        ]);

        let chunks: Vec<_> = decode_chunk_stream(body).collect().await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[1],
            Err(TransportError::Network("connection reset".into()))
        );
    }
}
