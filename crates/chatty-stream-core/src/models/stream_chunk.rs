use serde::Deserialize;
use serde_json::Value;

/// One decoded server-sent event from `POST stream/start`.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamChunk {
    Text(String),
    Thinking(String),
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
        is_error: bool,
    },
    WebSearchStart {
        id: Option<String>,
        name: String,
    },
    WebSearchQuery {
        id: Option<String>,
        partial_query: String,
    },
    WebSearchResult {
        tool_use_id: Option<String>,
        results: Vec<Value>,
    },
    MessageId(Value),
    SessionId(String),
    SurfaceContent {
        content_id: String,
        content_type: String,
        title: Option<String>,
        content: String,
    },
    Result {
        duration_ms: Option<u64>,
        total_cost_usd: Option<f64>,
    },
    /// The server honoured a stop request; the body closes right after.
    Stopped(String),
    Done,
    Error(String),
    /// Event type this client does not know about. Ignored.
    Unknown(String),
}

/// Flat view of every field any event type carries.
#[derive(Debug, Default, Deserialize)]
struct RawStreamEvent {
    #[serde(rename = "type")]
    event_type: Option<String>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    tool_use_id: Option<String>,
    #[serde(default)]
    is_error: Option<bool>,
    #[serde(default)]
    partial_query: Option<String>,
    #[serde(default)]
    results: Option<Vec<Value>>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    content_id: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    total_cost_usd: Option<f64>,
}

fn value_to_text(value: Option<Value>) -> String {
    match value {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn value_to_id(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(id)) => Some(id),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

impl StreamChunk {
    /// Decode the JSON payload of one `data:` frame.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        let raw: RawStreamEvent = serde_json::from_str(payload)?;
        let event_type = raw.event_type.clone().unwrap_or_default();

        let chunk = match event_type.as_str() {
            "text" => Self::Text(value_to_text(raw.content)),
            "thinking" => Self::Thinking(value_to_text(raw.content)),
            "tool_use" => Self::ToolUse {
                id: value_to_id(raw.id).unwrap_or_default(),
                name: raw.name.unwrap_or_default(),
                input: raw.input.unwrap_or(Value::Null),
            },
            "tool_result" => Self::ToolResult {
                tool_use_id: raw.tool_use_id.unwrap_or_default(),
                content: raw.content.unwrap_or(Value::Null),
                is_error: raw.is_error.unwrap_or(false),
            },
            "web_search_start" => Self::WebSearchStart {
                id: value_to_id(raw.id),
                name: raw.name.unwrap_or_else(|| "web_search".to_string()),
            },
            "web_search_query" => Self::WebSearchQuery {
                id: value_to_id(raw.id),
                partial_query: raw.partial_query.unwrap_or_default(),
            },
            "web_search_result" => Self::WebSearchResult {
                tool_use_id: raw.tool_use_id,
                results: raw.results.unwrap_or_default(),
            },
            "message_id" => Self::MessageId(raw.id.unwrap_or(Value::Null)),
            "session_id" => Self::SessionId(raw.session_id.unwrap_or_default()),
            "surface_content" => Self::SurfaceContent {
                content_id: raw.content_id.unwrap_or_default(),
                content_type: raw.content_type.unwrap_or_else(|| "html".to_string()),
                title: raw.title,
                content: value_to_text(raw.content),
            },
            "result" => Self::Result {
                duration_ms: raw.duration_ms,
                total_cost_usd: raw.total_cost_usd,
            },
            "stopped" => Self::Stopped(value_to_text(raw.content)),
            "done" => Self::Done,
            "error" => Self::Error(value_to_text(raw.content)),
            _ => Self::Unknown(event_type),
        };
        Ok(chunk)
    }

    /// Text that belongs in the assistant message being accumulated.
    pub fn accumulated_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}
