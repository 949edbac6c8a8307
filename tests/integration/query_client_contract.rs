//! Query client contract tests
//!
//! Verify the HTTP format the answering service expects: request bodies,
//! headers, batch answer parsing and SSE stream decoding.

use futures_util::StreamExt;
use hevar::api::{QueryBackend, QueryClient};
use hevar::config::ApiConfig;
use hevar::pipeline::messages::{StreamEvent, StreamFailure};
use hevar::{AssistantError, SessionId};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matches requests without an `Authorization` header.
struct NoAuthorization;

impl Match for NoAuthorization {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("authorization")
    }
}

fn client(server: &MockServer, token: Option<&str>) -> QueryClient {
    QueryClient::new(ApiConfig {
        base_url: server.uri(),
        token: token.map(str::to_owned),
        ..ApiConfig::default()
    })
    .unwrap()
}

async fn collect(stream: hevar::api::StreamEventStream) -> Vec<StreamEvent> {
    stream.collect().await
}

// ────────────────────────────────────────────────────────────────────────────
// Batch
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_request_body_and_bearer_token() {
    let mock_server = MockServer::start().await;
    let session = SessionId::generate();

    Mock::given(method("POST"))
        .and(path("/query"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(json!({
            "query": "What is Rust?",
            "session_id": session.as_str(),
            "show_timing": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "A systems programming language."
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let answer = client(&mock_server, Some("secret"))
        .query("What is Rust?", &session)
        .await
        .unwrap();
    assert_eq!(answer.as_deref(), Some("A systems programming language."));
}

#[tokio::test]
async fn no_authorization_header_without_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "ok"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let answer = client(&mock_server, None)
        .query("hi", &SessionId::generate())
        .await
        .unwrap();
    assert_eq!(answer.as_deref(), Some("ok"));
}

#[tokio::test]
async fn batch_falls_back_to_full_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "",
            "full_response": "The long answer."
        })))
        .mount(&mock_server)
        .await;

    let answer = client(&mock_server, None)
        .query("hi", &SessionId::generate())
        .await
        .unwrap();
    assert_eq!(answer.as_deref(), Some("The long answer."));
}

#[tokio::test]
async fn batch_http_error_is_transport_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, None)
        .query("hi", &SessionId::generate())
        .await
        .unwrap_err();
    assert!(matches!(err, AssistantError::TransportFailure(_)), "{err:?}");
    assert_eq!(err.user_message(), "Failed to process query");
}

#[tokio::test]
async fn custom_paths_are_honoured() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/ask"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "routed"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = QueryClient::new(ApiConfig {
        base_url: format!("{}/api/v2/", mock_server.uri()),
        query_path: "ask".into(),
        ..ApiConfig::default()
    })
    .unwrap();
    let answer = client.query("hi", &SessionId::generate()).await.unwrap();
    assert_eq!(answer.as_deref(), Some("routed"));
}

// ────────────────────────────────────────────────────────────────────────────
// Streaming
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_request_accepts_event_stream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query/stream"))
        .and(header("accept", "text/event-stream"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("data: Hello \n\ndata: world.\n\ndata: [DONE]\n\n", "text/event-stream"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let events = collect(
        client(&mock_server, Some("secret"))
            .query_stream("hi", &SessionId::generate())
            .await,
    )
    .await;
    assert_eq!(
        events,
        vec![
            StreamEvent::Data("Hello ".into()),
            StreamEvent::Data("world.".into()),
            StreamEvent::End,
        ]
    );
}

#[tokio::test]
async fn stream_error_event_is_protocol_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: partial\n\nevent: error\ndata: index offline\n\ndata: never\n\n",
            "text/event-stream",
        ))
        .mount(&mock_server)
        .await;

    let events = collect(
        client(&mock_server, None)
            .query_stream("hi", &SessionId::generate())
            .await,
    )
    .await;
    assert_eq!(
        events,
        vec![
            StreamEvent::Data("partial".into()),
            StreamEvent::Error(StreamFailure::Protocol("index offline".into())),
        ]
    );
}

#[tokio::test]
async fn stream_http_error_yields_single_transport_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query/stream"))
        .respond_with(ResponseTemplate::new(401).set_body_string("data: not sse\n\n"))
        .mount(&mock_server)
        .await;

    let events = collect(
        client(&mock_server, None)
            .query_stream("hi", &SessionId::generate())
            .await,
    )
    .await;
    assert_eq!(events.len(), 1);
    assert!(
        matches!(&events[0], StreamEvent::Error(StreamFailure::Transport(msg)) if msg.contains("401")),
        "{events:?}"
    );
}

#[tokio::test]
async fn stream_without_terminator_ends_at_eof() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query/stream"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("data: a\r\n\r\ndata: tail", "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let events = collect(
        client(&mock_server, None)
            .query_stream("hi", &SessionId::generate())
            .await,
    )
    .await;
    assert_eq!(
        events,
        vec![
            StreamEvent::Data("a".into()),
            StreamEvent::Data("tail".into()),
            StreamEvent::End,
        ]
    );
}
