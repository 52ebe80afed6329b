//! HTTP backend tests against a canned single-connection server
//!
//! Each test binds an ephemeral listener, serves one pre-baked HTTP
//! response, and captures the raw request for assertions.

use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use ziryab_core::{
    AuthSession, ChatBackend, ClientConfig, ClientError, ConversationId, HttpBackend,
    ResponseMode, SendRequest, ServerEvent,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one full HTTP request (headers plus Content-Length body)
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        let n = socket.read(&mut tmp).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() - (pos + 4) >= content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Serve exactly one connection with a fixed response; yields the base URL
/// and the captured raw request
async fn serve_once(response: String) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let _ = tx.send(request);
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });

    (format!("http://{addr}"), rx)
}

fn json_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn sse_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{body}"
    )
}

fn backend_at(base_url: &str, auth: AuthSession) -> HttpBackend {
    let config = ClientConfig {
        base_url: base_url.to_string(),
        ..ClientConfig::default()
    };
    HttpBackend::new(&config, auth)
}

fn send_request(mode: ResponseMode) -> SendRequest {
    SendRequest {
        content: "What is ihsan?".to_string(),
        use_rag: true,
        conversation_id: None,
        history: Vec::new(),
        mode,
    }
}

async fn drain(mut handle: ziryab_core::ExchangeHandle) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.events.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn streaming_exchange_end_to_end() {
    init_tracing();
    let body = "event: chunk\ndata: {\"token\":\"In\"}\n\n\
                event: chunk\ndata: {\"token\":\" the beginning\"}\n\n\
                event: end\ndata: [DONE]\n\n";
    let (base_url, request_rx) = serve_once(sse_response(body)).await;

    let backend = backend_at(&base_url, AuthSession::anonymous());
    let handle = backend
        .send_message(send_request(ResponseMode::Streaming))
        .await
        .unwrap();
    let events = drain(handle).await;

    assert_eq!(
        events,
        vec![
            ServerEvent::Chunk {
                token: "In".to_string()
            },
            ServerEvent::Chunk {
                token: " the beginning".to_string()
            },
            ServerEvent::End,
        ]
    );

    let request = request_rx.await.unwrap();
    assert!(request.starts_with("POST /chat/messages/stream HTTP/1.1"));
    assert!(request.contains("\"content\":\"What is ihsan?\""));
    assert!(request.contains("\"use_rag\":true"));
    // Anonymous requests carry no bearer token.
    assert!(!request.to_ascii_lowercase().contains("authorization:"));
}

#[tokio::test]
async fn complete_exchange_translates_to_events() {
    init_tracing();
    let body = r#"{"ai_response":"Full answer.","sources":[{"document_id":"d1"}],"conversation_id":"c1","user_message_id":"m1","ai_message_id":"m2"}"#;
    let (base_url, request_rx) = serve_once(json_response("200 OK", body)).await;

    let backend = backend_at(&base_url, AuthSession::with_token("tok-1"));
    let handle = backend
        .send_message(send_request(ResponseMode::Complete))
        .await
        .unwrap();
    let events = drain(handle).await;

    assert_eq!(events.len(), 6);
    assert_eq!(
        events[0],
        ServerEvent::ConversationConfirmed(ConversationId("c1".to_string()))
    );
    assert!(matches!(events[2], ServerEvent::Chunk { ref token } if token == "Full answer."));
    assert_eq!(events[5], ServerEvent::End);

    let request = request_rx.await.unwrap();
    assert!(request.starts_with("POST /chat/messages HTTP/1.1"));
    // Authenticated new conversation: explicit null, no local history.
    assert!(request.contains("\"conversation_id\":null"));
    assert!(!request.contains("\"history\""));
}

#[tokio::test]
async fn bearer_token_attached_when_authenticated() {
    init_tracing();
    let (base_url, request_rx) =
        serve_once(json_response("200 OK", r#"{"messages":[]}"#)).await;

    let backend = backend_at(&base_url, AuthSession::with_token("tok-123"));
    let history = backend
        .fetch_history(&ConversationId("c1".to_string()))
        .await
        .unwrap();
    assert!(history.is_empty());

    let request = request_rx.await.unwrap();
    assert!(request.starts_with("GET /chat/conversations/c1/messages HTTP/1.1"));
    assert!(request
        .to_ascii_lowercase()
        .contains("authorization: bearer tok-123"));
}

#[tokio::test]
async fn unknown_conversation_history_is_empty() {
    init_tracing();
    let (base_url, _request_rx) =
        serve_once(json_response("404 Not Found", r#"{"detail":"not found"}"#)).await;

    let backend = backend_at(&base_url, AuthSession::with_token("tok-1"));
    let history = backend
        .fetch_history(&ConversationId("missing".to_string()))
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn history_sorted_oldest_first() {
    init_tracing();
    let body = r#"{"messages":[
        {"message_id":"m2","conversation_id":"c1","content":"answer","message_type":"ai","timestamp":"2025-03-01T12:05:00Z"},
        {"message_id":"m1","conversation_id":"c1","content":"question","message_type":"user","timestamp":"2025-03-01T12:00:00Z"}
    ]}"#;
    let (base_url, _request_rx) = serve_once(json_response("200 OK", body)).await;

    let backend = backend_at(&base_url, AuthSession::with_token("tok-1"));
    let history = backend
        .fetch_history(&ConversationId("c1".to_string()))
        .await
        .unwrap();

    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "question");
    assert_eq!(history[1].content, "answer");
}

#[tokio::test]
async fn status_detail_extracted_from_body() {
    init_tracing();
    let (base_url, _request_rx) = serve_once(json_response(
        "422 Unprocessable Entity",
        r#"{"detail":"content must not be empty"}"#,
    ))
    .await;

    let backend = backend_at(&base_url, AuthSession::with_token("tok-1"));
    let err = backend.create_conversation().await.unwrap_err();
    match err {
        ClientError::Status { status, detail } => {
            assert_eq!(status, 422);
            assert_eq!(detail, "content must not be empty");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn http_error_during_exchange_becomes_error_event() {
    init_tracing();
    let (base_url, _request_rx) = serve_once(json_response(
        "500 Internal Server Error",
        r#"{"detail":"model backend unavailable"}"#,
    ))
    .await;

    let backend = backend_at(&base_url, AuthSession::anonymous());
    let handle = backend
        .send_message(send_request(ResponseMode::Streaming))
        .await
        .unwrap();
    let events = drain(handle).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        ServerEvent::Error { detail } => {
            assert!(detail.contains("model backend unavailable"));
        }
        other => panic!("expected error event, got {other:?}"),
    }
}

#[tokio::test]
async fn login_stores_bearer_token() {
    init_tracing();
    let (base_url, request_rx) = serve_once(json_response(
        "200 OK",
        r#"{"access_token":"tok-9","token_type":"bearer"}"#,
    ))
    .await;

    let auth = AuthSession::anonymous();
    let backend = backend_at(&base_url, auth.clone());
    backend.login("reader@example.org", "hunter2").await.unwrap();

    assert!(auth.is_authenticated());
    assert_eq!(auth.token().as_deref(), Some("tok-9"));

    let request = request_rx.await.unwrap();
    assert!(request.starts_with("POST /auth/login HTTP/1.1"));
    assert!(request.contains("reader@example.org"));
}

#[tokio::test]
async fn delete_conversation_succeeds_on_204() {
    init_tracing();
    let response =
        "HTTP/1.1 204 No Content\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
    let (base_url, request_rx) = serve_once(response).await;

    let backend = backend_at(&base_url, AuthSession::with_token("tok-1"));
    backend
        .delete_conversation(&ConversationId("c1".to_string()))
        .await
        .unwrap();

    let request = request_rx.await.unwrap();
    assert!(request.starts_with("DELETE /chat/conversations/c1 HTTP/1.1"));
}
