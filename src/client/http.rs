//! HTTP Backend Implementation
//!
//! Production [`ChatBackend`] over the chat service's REST+event-stream
//! API:
//! - `POST /chat/messages` - Complete JSON exchange
//! - `POST /chat/messages/stream` - Streaming exchange (server-sent events)
//! - `GET /chat/conversations/{id}/messages` - Conversation history
//! - `GET/POST /chat/conversations`, `DELETE /chat/conversations/{id}`
//! - `POST /auth/login`, `POST /auth/register`
//!
//! Every exchange, streamed or complete, is delivered to the session as the
//! same ordered feed of [`ServerEvent`]s, so the state machine never
//! branches on delivery mode.

use async_trait::async_trait;
use futures::future::{AbortHandle, Abortable};
use tokio::sync::mpsc;

use crate::auth::AuthSession;
use crate::client::traits::{ChatBackend, ExchangeHandle, ResponseMode, SendRequest};
use crate::client::wire::{
    ChatResponse, ConversationsResponse, CreateConversationResponse, HistoryResponse, LoginBody,
    LoginResponse, RegisterBody,
};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::messages::{Conversation, ConversationId, Message, MessageId};
use crate::sse::{parse_sse, SseError, SseHandler, SseRecord};
use crate::stream::{decode_record, ServerEvent};

/// HTTP chat backend client
#[derive(Clone)]
pub struct HttpBackend {
    /// Service root, e.g. `http://localhost:8000`
    base_url: String,
    /// Bearer-token holder; absence means anonymous mode
    auth: AuthSession,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend client
    #[must_use]
    pub fn new(config: &ClientConfig, auth: AuthSession) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth,
            http_client: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// The auth session this client authenticates with
    #[must_use]
    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    fn messages_url(&self) -> String {
        format!("{}/chat/messages", self.base_url)
    }

    fn stream_url(&self) -> String {
        format!("{}/chat/messages/stream", self.base_url)
    }

    fn conversations_url(&self) -> String {
        format!("{}/chat/conversations", self.base_url)
    }

    fn conversation_url(&self, id: &ConversationId) -> String {
        format!("{}/chat/conversations/{}", self.base_url, id.0)
    }

    fn history_url(&self, id: &ConversationId) -> String {
        format!("{}/chat/conversations/{}/messages", self.base_url, id.0)
    }

    /// Attach the bearer token when one is present
    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Build the JSON body for a send
    ///
    /// Authenticated requests name the conversation (explicitly `null` for
    /// a new one) and never carry history: the backend owns it.
    /// Anonymous requests carry recent local history instead, since the
    /// backend persists nothing for them.
    #[must_use]
    pub fn build_send_body(request: &SendRequest, authenticated: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "content": request.content,
            "use_rag": request.use_rag,
        });

        if authenticated {
            body["conversation_id"] = match &request.conversation_id {
                Some(id) => serde_json::Value::String(id.0.clone()),
                None => serde_json::Value::Null,
            };
        } else if !request.history.is_empty() {
            body["history"] = serde_json::json!(request.history);
        }

        body
    }

    /// Authenticate and store the bearer token in the shared session
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let body = LoginBody {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self
            .http_client
            .post(format!("{}/auth/login", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let login: LoginResponse = response.json().await?;
        self.auth.refresh(login.access_token);
        tracing::info!("login succeeded");
        Ok(())
    }

    /// Register a new account, then log in with the same credentials
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<(), ClientError> {
        let body = RegisterBody {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        };
        let response = self
            .http_client
            .post(format!("{}/auth/register", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        self.login(email, password).await
    }
}

/// Extract a failure message from a non-2xx response
///
/// Prefers the JSON body's `detail` (or `message`) field; falls back to the
/// status line when the body is opaque.
async fn status_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let fallback = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();
    let detail = match response.text().await {
        Ok(body) => serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("detail")
                    .or_else(|| v.get("message"))
                    .and_then(|d| d.as_str())
                    .map(String::from)
            })
            .unwrap_or(fallback),
        Err(_) => fallback,
    };
    ClientError::Status {
        status: status.as_u16(),
        detail,
    }
}

/// Forwards decoded stream records into an exchange's event channel
struct EventForwarder {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl SseHandler for EventForwarder {
    fn on_record(&mut self, record: SseRecord) {
        if let Some(event) = decode_record(&record) {
            // A closed channel means the session already moved on.
            let _ = self.tx.send(event);
        }
    }

    fn on_error(&mut self, error: SseError) {
        let _ = self.tx.send(ServerEvent::Error {
            detail: error.to_string(),
        });
    }

    fn on_close(&mut self) {
        let _ = self.tx.send(ServerEvent::End);
    }
}

/// Translate a complete JSON response into the ordered event feed
///
/// Id confirmations come before content so the session reconciles ids
/// first, exactly as the streaming endpoint orders its events.
fn emit_complete_response(tx: &mpsc::UnboundedSender<ServerEvent>, response: ChatResponse) {
    if let Some(id) = response.conversation_id {
        let _ = tx.send(ServerEvent::ConversationConfirmed(ConversationId(id)));
    }
    if let Some(id) = response.user_message_id {
        let _ = tx.send(ServerEvent::UserMessageConfirmed(MessageId(id)));
    }
    let _ = tx.send(ServerEvent::Chunk {
        token: response.ai_response,
    });
    if !response.sources.is_empty() {
        let _ = tx.send(ServerEvent::Sources(response.sources));
    }
    if let Some(id) = response.ai_message_id {
        let _ = tx.send(ServerEvent::AssistantMessageConfirmed(MessageId(id)));
    }
    let _ = tx.send(ServerEvent::End);
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn send_message(&self, request: SendRequest) -> Result<ExchangeHandle, ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (abort_handle, abort_registration) = AbortHandle::new_pair();

        let url = match request.mode {
            ResponseMode::Complete => self.messages_url(),
            ResponseMode::Streaming => self.stream_url(),
        };
        let body = Self::build_send_body(&request, self.auth.is_authenticated());
        let http_request = self.with_auth(self.http_client.post(&url)).json(&body);
        let mode = request.mode;

        tracing::debug!(url = %url, ?mode, "starting exchange");

        // The exchange runs detached; aborting the handle drops everything,
        // which closes the channel and the session observes disconnection.
        let exchange = async move {
            let response = match http_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let _ = tx.send(ServerEvent::Error {
                        detail: e.to_string(),
                    });
                    return;
                }
            };

            if !response.status().is_success() {
                let err = status_error(response).await;
                let _ = tx.send(ServerEvent::Error {
                    detail: err.to_string(),
                });
                return;
            }

            match mode {
                ResponseMode::Streaming => {
                    let mut forwarder = EventForwarder { tx };
                    parse_sse(response.bytes_stream(), &mut forwarder).await;
                }
                ResponseMode::Complete => match response.json::<ChatResponse>().await {
                    Ok(parsed) => emit_complete_response(&tx, parsed),
                    Err(e) => {
                        let _ = tx.send(ServerEvent::Error {
                            detail: e.to_string(),
                        });
                    }
                },
            }
        };

        tokio::spawn(Abortable::new(exchange, abort_registration));

        Ok(ExchangeHandle {
            events: rx,
            abort: abort_handle,
        })
    }

    async fn fetch_history(&self, id: &ConversationId) -> Result<Vec<Message>, ClientError> {
        if !self.auth.is_authenticated() {
            return Err(ClientError::AuthRequired);
        }

        let response = self
            .with_auth(self.http_client.get(self.history_url(id)))
            .send()
            .await?;

        // A conversation the backend does not know yet (just created
        // locally, or already deleted) simply has no messages.
        if response.status().as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let history: HistoryResponse = response.json().await?;
        let mut messages: Vec<Message> = history
            .messages
            .into_iter()
            .map(super::wire::BackendMessage::into_message)
            .collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(messages)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        // Anonymous users have nothing persisted; skip the round-trip.
        if !self.auth.is_authenticated() {
            return Ok(Vec::new());
        }

        let response = self
            .with_auth(self.http_client.get(self.conversations_url()))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let listed: ConversationsResponse = response.json().await?;
        Ok(listed
            .conversations
            .into_iter()
            .map(super::wire::BackendConversation::into_conversation)
            .collect())
    }

    async fn create_conversation(&self) -> Result<ConversationId, ClientError> {
        if !self.auth.is_authenticated() {
            return Err(ClientError::AuthRequired);
        }

        let response = self
            .with_auth(self.http_client.post(self.conversations_url()))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let created: CreateConversationResponse = response.json().await?;
        Ok(ConversationId(created.conversation_id))
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), ClientError> {
        if !self.auth.is_authenticated() {
            return Err(ClientError::AuthRequired);
        }

        let response = self
            .with_auth(self.http_client.delete(self.conversation_url(id)))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::wire::HistoryEntry;
    use pretty_assertions::assert_eq;

    fn request(conversation_id: Option<&str>, history: Vec<HistoryEntry>) -> SendRequest {
        SendRequest {
            content: "what is ihsan?".to_string(),
            use_rag: true,
            conversation_id: conversation_id.map(|id| ConversationId(id.to_string())),
            history,
            mode: ResponseMode::Streaming,
        }
    }

    #[test]
    fn test_authenticated_body_names_conversation() {
        let body = HttpBackend::build_send_body(&request(Some("c1"), Vec::new()), true);
        assert_eq!(body["content"], "what is ihsan?");
        assert_eq!(body["use_rag"], true);
        assert_eq!(body["conversation_id"], "c1");
        assert!(body.get("history").is_none());
    }

    #[test]
    fn test_authenticated_new_conversation_is_explicit_null() {
        let body = HttpBackend::build_send_body(&request(None, Vec::new()), true);
        assert!(body["conversation_id"].is_null());
        assert!(body.as_object().unwrap().contains_key("conversation_id"));
    }

    #[test]
    fn test_authenticated_body_never_carries_history() {
        let history = vec![HistoryEntry {
            role: "user".to_string(),
            content: "earlier turn".to_string(),
        }];
        let body = HttpBackend::build_send_body(&request(Some("c1"), history), true);
        assert!(body.get("history").is_none());
    }

    #[test]
    fn test_anonymous_body_carries_history_not_conversation() {
        let history = vec![HistoryEntry {
            role: "user".to_string(),
            content: "earlier turn".to_string(),
        }];
        let body = HttpBackend::build_send_body(&request(None, history), false);
        assert!(body.get("conversation_id").is_none());
        assert_eq!(body["history"][0]["content"], "earlier turn");
    }

    #[test]
    fn test_anonymous_body_omits_empty_history() {
        let body = HttpBackend::build_send_body(&request(None, Vec::new()), false);
        assert!(body.get("history").is_none());
    }

    #[test]
    fn test_url_shapes() {
        let config = ClientConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..ClientConfig::default()
        };
        let backend = HttpBackend::new(&config, AuthSession::anonymous());
        assert_eq!(backend.messages_url(), "http://localhost:8000/chat/messages");
        assert_eq!(
            backend.stream_url(),
            "http://localhost:8000/chat/messages/stream"
        );
        assert_eq!(
            backend.history_url(&ConversationId("c1".to_string())),
            "http://localhost:8000/chat/conversations/c1/messages"
        );
    }

    #[tokio::test]
    async fn test_anonymous_guards() {
        let backend = HttpBackend::new(&ClientConfig::default(), AuthSession::anonymous());

        // No network traffic for an anonymous list.
        assert!(backend.list_conversations().await.unwrap().is_empty());

        let id = ConversationId("c1".to_string());
        assert!(matches!(
            backend.fetch_history(&id).await,
            Err(ClientError::AuthRequired)
        ));
        assert!(matches!(
            backend.create_conversation().await,
            Err(ClientError::AuthRequired)
        ));
        assert!(matches!(
            backend.delete_conversation(&id).await,
            Err(ClientError::AuthRequired)
        ));
    }

    #[test]
    fn test_complete_response_event_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let response = ChatResponse {
            ai_response: "full answer".to_string(),
            sources: vec![crate::messages::Source {
                document_id: "d1".to_string(),
                book_name: None,
                section_title: None,
                score: None,
                url: None,
                content_snippet: None,
            }],
            conversation_id: Some("c1".to_string()),
            user_message_id: Some("m1".to_string()),
            ai_message_id: Some("m2".to_string()),
        };
        emit_complete_response(&tx, response);
        drop(tx);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 6);
        assert!(matches!(events[0], ServerEvent::ConversationConfirmed(_)));
        assert!(matches!(events[1], ServerEvent::UserMessageConfirmed(_)));
        assert!(matches!(events[2], ServerEvent::Chunk { .. }));
        assert!(matches!(events[3], ServerEvent::Sources(_)));
        assert!(matches!(events[4], ServerEvent::AssistantMessageConfirmed(_)));
        assert!(matches!(events[5], ServerEvent::End));
    }
}
