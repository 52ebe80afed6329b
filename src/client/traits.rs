//! Backend Abstraction
//!
//! The session state machine never names a concrete transport; it holds an
//! `Arc<B: ChatBackend>` and drives exchanges through these types. Tests
//! substitute an in-process mock, production uses [`crate::client::HttpBackend`].

use async_trait::async_trait;
use futures::future::AbortHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ClientError;
use crate::messages::{Conversation, ConversationId, Message};
use crate::stream::ServerEvent;
use crate::client::wire::HistoryEntry;

/// How the assistant response should be delivered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Single JSON response, translated into events once complete
    Complete,
    /// Incremental event stream
    #[default]
    Streaming,
}

/// Everything needed to send one user message
#[derive(Clone, Debug)]
pub struct SendRequest {
    /// The user's message text, already trimmed and non-empty
    pub content: String,
    /// Whether the backend should ground the answer in retrieved sources
    pub use_rag: bool,
    /// Durable conversation id, or `None` for a brand-new conversation
    ///
    /// Sentinel ids never cross this boundary; the session strips them.
    pub conversation_id: Option<ConversationId>,
    /// Recent local turns, sent only on anonymous requests so a stateless
    /// backend still has context
    pub history: Vec<HistoryEntry>,
    /// Delivery mode for the response
    pub mode: ResponseMode,
}

/// A live exchange: the event feed plus a way to abandon it
#[derive(Debug)]
pub struct ExchangeHandle {
    /// Ordered events for this exchange; the channel closing means the
    /// exchange ended, however it ended
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
    /// Aborts the underlying request and stops further events
    pub abort: AbortHandle,
}

/// The operations a chat backend must support
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start an exchange for one user message
    ///
    /// Resolves as soon as the exchange is underway; the response itself
    /// arrives through the returned handle's event feed. An `Err` here means
    /// the exchange could not even start.
    async fn send_message(&self, request: SendRequest) -> Result<ExchangeHandle, ClientError>;

    /// Fetch a conversation's messages, oldest first
    async fn fetch_history(&self, id: &ConversationId) -> Result<Vec<Message>, ClientError>;

    /// List the caller's conversations
    ///
    /// Anonymous callers have no persisted conversations; implementations
    /// return an empty list without touching the network.
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ClientError>;

    /// Create an empty conversation, returning its durable id
    async fn create_conversation(&self) -> Result<ConversationId, ClientError>;

    /// Delete a conversation
    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), ClientError>;
}
