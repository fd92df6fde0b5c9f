use std::collections::HashMap;

use chatty_stream_core::{
    NotificationSeverity, StreamChunk, StreamEvent, StreamKind, StreamOutcome, StreamStatus,
};

pub fn status_line(conversation_id: &str, status: &StreamStatus) -> String {
    if !status.streaming {
        return format!("{conversation_id}  idle");
    }
    let kind = match status.kind {
        Some(StreamKind::Agent) => "agent",
        Some(StreamKind::Normal) => "normal",
        None => "unknown",
    };
    let stoppable = if status.stoppable { "  stoppable" } else { "" };
    format!("{conversation_id}  streaming ({kind}){stoppable}")
}

pub fn status_table(statuses: &HashMap<String, StreamStatus>) -> Vec<String> {
    let mut ids: Vec<_> = statuses
        .iter()
        .filter(|(_, status)| status.streaming)
        .map(|(id, _)| id.as_str())
        .collect();
    ids.sort_unstable();
    ids.into_iter()
        .map(|id| status_line(id, &statuses[id]))
        .collect()
}

/// Inline text for chunks that belong in the response body.
pub fn chunk_text(chunk: &StreamChunk) -> Option<String> {
    match chunk {
        StreamChunk::Text(text) => Some(text.clone()),
        StreamChunk::ToolUse { name, .. } => Some(format!("\n[tool: {name}]\n")),
        StreamChunk::ToolResult { is_error: true, .. } => Some("\n[tool failed]\n".to_string()),
        StreamChunk::WebSearchStart { .. } => Some("\n[searching the web]\n".to_string()),
        StreamChunk::Stopped(message) => Some(format!("\n[{message}]\n")),
        _ => None,
    }
}

/// One-line description of an event for `watch`. Chunks are left to
/// [`chunk_text`].
pub fn event_line(event: &StreamEvent) -> Option<String> {
    match event {
        StreamEvent::StatusChanged {
            conversation_id,
            status,
        } => Some(status_line(conversation_id, status)),
        StreamEvent::TaskAdded { conversation_id } => {
            Some(format!("{conversation_id}  agent task started"))
        }
        StreamEvent::TaskCompleted { conversation_id } => {
            Some(format!("{conversation_id}  agent task finished"))
        }
        StreamEvent::StreamEnded {
            conversation_id,
            outcome,
        } => {
            let outcome = match outcome {
                StreamOutcome::Completed => "completed".to_string(),
                StreamOutcome::Aborted => "aborted".to_string(),
                StreamOutcome::Errored(message) => format!("failed: {message}"),
            };
            Some(format!("{conversation_id}  stream {outcome}"))
        }
        StreamEvent::Notification {
            conversation_id,
            severity,
            message,
        } => {
            let level = match severity {
                NotificationSeverity::Info => "info",
                NotificationSeverity::Warning => "warning",
                NotificationSeverity::Error => "error",
            };
            Some(match conversation_id {
                Some(id) => format!("{id}  {level}: {message}"),
                None => format!("{level}: {message}"),
            })
        }
        StreamEvent::SteerRejected {
            conversation_id,
            guidance,
            message,
        } => Some(format!(
            "{conversation_id}  guidance not applied ({message}): {guidance}"
        )),
        StreamEvent::ConversationSelected { .. }
        | StreamEvent::ConversationLoaded { .. }
        | StreamEvent::Chunk { .. } => None,
    }
}
