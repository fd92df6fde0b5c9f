use chatty_backend_client::{BackendClient, ClientError};
use chatty_stream_core::{
    ClientSettings, ConversationSource, MessageStore, StreamChunk, StreamKind, StreamRequest,
    StreamStatusSource, StreamTransport, TransportError,
};
use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> BackendClient {
    let settings = ClientSettings {
        base_url: format!("{}/api", server.uri()),
        ..Default::default()
    };
    BackendClient::new(&settings).unwrap()
}

#[tokio::test]
async fn fetch_status_reads_agent_stream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stream-status/conv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "streaming": true,
            "type": "agent",
            "stoppable": true
        })))
        .mount(&server)
        .await;

    let status = StreamStatusSource::fetch_status(&client_for(&server), "conv-1")
        .await
        .unwrap();

    assert!(status.streaming);
    assert_eq!(status.kind, Some(StreamKind::Agent));
    assert!(status.stoppable);
}

#[tokio::test]
async fn fetch_status_tolerates_minimal_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stream-status/conv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "streaming": false })))
        .mount(&server)
        .await;

    let status = client_for(&server).fetch_status("conv-1").await.unwrap();
    assert!(!status.streaming);
    assert_eq!(status.kind, None);
}

#[tokio::test]
async fn fetch_all_returns_map() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stream-status/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "conv-1": { "streaming": true, "type": "normal", "stoppable": false },
            "conv-2": { "streaming": true, "type": "agent", "stoppable": true }
        })))
        .mount(&server)
        .await;

    let all = StreamStatusSource::fetch_all(&client_for(&server))
        .await
        .unwrap();

    assert_eq!(all.len(), 2);
    assert!(!all["conv-1"].stoppable);
    assert!(all["conv-2"].stoppable);
}

#[tokio::test]
async fn http_errors_map_to_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stream-status/all"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(matches!(
        client.fetch_all().await,
        Err(ClientError::Status { status: 500, .. })
    ));
    assert_eq!(
        StreamStatusSource::fetch_all(&client).await.unwrap_err(),
        TransportError::Http {
            status: 500,
            body: "boom".into()
        }
    );
}

#[tokio::test]
async fn bad_json_maps_to_decode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stream-status/conv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let error = StreamStatusSource::fetch_status(&client_for(&server), "conv-1")
        .await
        .unwrap_err();
    assert!(matches!(error, TransportError::Decode(_)));
}

#[tokio::test]
async fn connection_refused_maps_to_network() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    drop(server);

    let error = StreamStatusSource::fetch_all(&client).await.unwrap_err();
    assert!(matches!(error, TransportError::Network(_)));
}

#[tokio::test]
async fn open_decodes_event_stream() {
    let server = MockServer::start().await;
    let body = concat!(
        ": ping\n\n",
        "data: {\"type\":\"message_id\",\"id\":42}\n\n",
        "data: {\"type\":\"text\",\"content\":\"Hel\"}\n\n",
        "data: {\"type\":\"text\",\"content\":\"lo\"}\n\n",
        "data: {\"type\":\"tool_use\",\"id\":\"t1\",\"name\":\"Read\",\"input\":{\"path\":\"a.rs\"}}\n\n",
        "data: {\"type\":\"done\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/stream/start"))
        .and(body_json(json!({
            "conversation_id": "conv-1",
            "type": "agent",
            "messages": [{ "role": "user", "content": "hi" }]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let request = StreamRequest::new("conv-1", StreamKind::Agent).with_user_message("hi");
    let stream = StreamTransport::open(&client_for(&server), request)
        .await
        .unwrap();
    let chunks: Vec<_> = stream.map(Result::unwrap).collect().await;

    assert_eq!(chunks.len(), 5);
    assert_eq!(chunks[0], StreamChunk::MessageId(json!(42)));
    assert_eq!(chunks[1], StreamChunk::Text("Hel".into()));
    assert!(matches!(&chunks[3], StreamChunk::ToolUse { name, .. } if name == "Read"));
    assert_eq!(chunks[4], StreamChunk::Done);
}

#[tokio::test]
async fn open_rejected_by_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/stream/start"))
        .respond_with(ResponseTemplate::new(409).set_body_string("already streaming"))
        .mount(&server)
        .await;

    let request = StreamRequest::new("conv-1", StreamKind::Normal);
    let result = StreamTransport::open(&client_for(&server), request).await;

    assert!(matches!(result, Err(TransportError::Http { status: 409, .. })));
}

#[tokio::test]
async fn stop_reports_success_flag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/stream/stop/conv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Stop signal sent"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/stream/stop/conv-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "No active stream found for this conversation"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(StreamTransport::stop(&client, "conv-1").await.unwrap());
    assert!(!StreamTransport::stop(&client, "conv-2").await.unwrap());
}

#[tokio::test]
async fn steer_sends_guidance_and_partial_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/stream/steer/conv-1"))
        .and(body_json(json!({
            "guidance": "use rust",
            "accumulated_content": "Starting in python"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let ack = StreamTransport::steer(
        &client_for(&server),
        "conv-1",
        "use rust",
        "Starting in python",
    )
    .await
    .unwrap();

    assert!(ack.success);
    assert_eq!(ack.message, None);
}

#[tokio::test]
async fn load_and_append_messages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/conv-1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [
                { "id": "m1", "role": "user", "content": "hi" },
                { "id": "m2", "role": "assistant", "content": [{ "type": "text", "text": "hello" }] }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/conversations/conv-1/messages"))
        .and(body_json(json!({ "role": "assistant", "content": "done" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "m3" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let messages = ConversationSource::load_messages(&client, "conv-1")
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].text(), "hello");

    MessageStore::append_assistant_message(&client, "conv-1", "done".into())
        .await
        .unwrap();
}
