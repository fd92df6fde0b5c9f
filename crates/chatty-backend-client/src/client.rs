use std::collections::HashMap;
use std::time::Duration;

use chatty_stream_core::services::{BoxFuture, ChunkStream};
use chatty_stream_core::{
    ClientSettings, ConversationMessage, ConversationSource, MessageStore, SteerAck,
    StreamRequest, StreamStatus, StreamStatusSource, StreamTransport, TransportError,
};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{ClientError, truncate_body};
use crate::sse::decode_chunk_stream;

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<ConversationMessage>,
}

#[derive(Debug, Serialize)]
struct SteerBody<'a> {
    guidance: &'a str,
    accumulated_content: &'a str,
}

/// Talks to the backend's `stream`, `stream-status` and `conversations`
/// endpoints. Cheap to clone.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl BackendClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, ClientError> {
        let base_url = Url::parse(&settings.base_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: settings.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: settings.base_url.clone(),
                reason: "not a hierarchical URL".into(),
            });
        }

        // No overall timeout on the client: streams stay open as long as the
        // server keeps them. Plain requests get one per call.
        let client = Client::builder()
            .connect_timeout(settings.request_timeout())
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            client,
            base_url,
            request_timeout: settings.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            body: truncate_body(&body),
        })
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = Self::send(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn fetch_status(&self, conversation_id: &str) -> Result<StreamStatus, ClientError> {
        let url = self.endpoint(&["stream-status", conversation_id]);
        Self::send_json(self.client.get(url).timeout(self.request_timeout)).await
    }

    pub async fn fetch_all(&self) -> Result<HashMap<String, StreamStatus>, ClientError> {
        let url = self.endpoint(&["stream-status", "all"]);
        Self::send_json(self.client.get(url).timeout(self.request_timeout)).await
    }

    pub async fn open(&self, request: &StreamRequest) -> Result<ChunkStream, ClientError> {
        let url = self.endpoint(&["stream", "start"]);
        debug!(conv_id = %request.conversation_id, kind = ?request.kind, "Opening stream");
        let response = Self::send(
            self.client
                .post(url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .json(request),
        )
        .await?;
        Ok(decode_chunk_stream(response.bytes_stream()))
    }

    pub async fn stop(&self, conversation_id: &str) -> Result<SteerAck, ClientError> {
        let url = self.endpoint(&["stream", "stop", conversation_id]);
        Self::send_json(self.client.post(url).timeout(self.request_timeout)).await
    }

    pub async fn steer(
        &self,
        conversation_id: &str,
        guidance: &str,
        accumulated_content: &str,
    ) -> Result<SteerAck, ClientError> {
        let url = self.endpoint(&["stream", "steer", conversation_id]);
        let body = SteerBody {
            guidance,
            accumulated_content,
        };
        Self::send_json(
            self.client
                .post(url)
                .timeout(self.request_timeout)
                .json(&body),
        )
        .await
    }

    pub async fn load_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ConversationMessage>, ClientError> {
        let url = self.endpoint(&["conversations", conversation_id, "messages"]);
        let response: MessagesResponse =
            Self::send_json(self.client.get(url).timeout(self.request_timeout)).await?;
        Ok(response.messages)
    }

    pub async fn append_assistant_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<(), ClientError> {
        let url = self.endpoint(&["conversations", conversation_id, "messages"]);
        Self::send(
            self.client
                .post(url)
                .timeout(self.request_timeout)
                .json(&json!({ "role": "assistant", "content": content })),
        )
        .await?;
        Ok(())
    }
}

impl StreamStatusSource for BackendClient {
    fn fetch_status(
        &self,
        conversation_id: &str,
    ) -> BoxFuture<'static, Result<StreamStatus, TransportError>> {
        let client = self.clone();
        let conversation_id = conversation_id.to_string();
        Box::pin(async move { Ok(BackendClient::fetch_status(&client, &conversation_id).await?) })
    }

    fn fetch_all(
        &self,
    ) -> BoxFuture<'static, Result<HashMap<String, StreamStatus>, TransportError>> {
        let client = self.clone();
        Box::pin(async move { Ok(BackendClient::fetch_all(&client).await?) })
    }
}

impl StreamTransport for BackendClient {
    fn open(
        &self,
        request: StreamRequest,
    ) -> BoxFuture<'static, Result<ChunkStream, TransportError>> {
        let client = self.clone();
        Box::pin(async move { Ok(BackendClient::open(&client, &request).await?) })
    }

    fn stop(&self, conversation_id: &str) -> BoxFuture<'static, Result<bool, TransportError>> {
        let client = self.clone();
        let conversation_id = conversation_id.to_string();
        Box::pin(async move {
            let ack = BackendClient::stop(&client, &conversation_id).await?;
            Ok(ack.success)
        })
    }

    fn steer(
        &self,
        conversation_id: &str,
        guidance: &str,
        accumulated_content: &str,
    ) -> BoxFuture<'static, Result<SteerAck, TransportError>> {
        let client = self.clone();
        let conversation_id = conversation_id.to_string();
        let guidance = guidance.to_string();
        let accumulated_content = accumulated_content.to_string();
        Box::pin(async move {
            Ok(BackendClient::steer(&client, &conversation_id, &guidance, &accumulated_content).await?)
        })
    }
}

impl ConversationSource for BackendClient {
    fn load_messages(
        &self,
        conversation_id: &str,
    ) -> BoxFuture<'static, Result<Vec<ConversationMessage>, TransportError>> {
        let client = self.clone();
        let conversation_id = conversation_id.to_string();
        Box::pin(async move { Ok(BackendClient::load_messages(&client, &conversation_id).await?) })
    }
}

impl MessageStore for BackendClient {
    fn append_assistant_message(
        &self,
        conversation_id: &str,
        content: String,
    ) -> BoxFuture<'static, Result<(), TransportError>> {
        let client = self.clone();
        let conversation_id = conversation_id.to_string();
        Box::pin(async move {
            Ok(BackendClient::append_assistant_message(&client, &conversation_id, &content).await?)
        })
    }
}
