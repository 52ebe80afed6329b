//! Conversation Data Model
//!
//! The types a UI surface reads: messages, retrieval sources, and
//! conversation summaries, plus the identifier newtypes used to track
//! optimistic (locally generated) ids until the backend confirms durable
//! ones.
//!
//! # Design Philosophy
//!
//! Local ids are cheap and deterministic-ish (`user-`/`ai-` prefix plus a
//! millisecond timestamp and an atomic counter); they exist only so the UI
//! can key messages before the server has spoken. A brand-new conversation
//! starts under a `temp-conv-` sentinel id that is rewritten everywhere once
//! the backend assigns the real one (see [`crate::session`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message identifier
///
/// Either a locally generated optimistic id (`user-*` / `ai-*`) or a
/// durable server-assigned id after confirmation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a local id for an optimistic user message
    #[must_use]
    pub fn local_user() -> Self {
        Self(format!("user-{}", next_local_suffix()))
    }

    /// Generate a local id for an assistant placeholder
    #[must_use]
    pub fn local_assistant() -> Self {
        Self(format!("ai-{}", next_local_suffix()))
    }
}

/// Conversation identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Generate a sentinel id for a conversation the backend has not
    /// created yet
    #[must_use]
    pub fn sentinel() -> Self {
        Self(format!("temp-conv-{}", next_local_suffix()))
    }

    /// Whether this id is a local sentinel rather than a durable backend id
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.0.starts_with("temp-conv-")
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique suffix for locally generated ids
///
/// Timestamp plus an atomic counter so ids created in the same millisecond
/// still differ.
fn next_local_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::SeqCst);
    let timestamp = Utc::now().timestamp_millis();
    format!("{timestamp}-{count}")
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    /// User input
    User,
    /// AI assistant response
    Assistant,
}

/// A retrieved reference backing an assistant answer
///
/// Field names match the backend wire shape; the client never reorders
/// sources beyond the rank the backend delivered them in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Id of the source document in the vector store
    pub document_id: String,
    /// Name of the source book, when known
    #[serde(default)]
    pub book_name: Option<String>,
    /// Section title within the book
    #[serde(default)]
    pub section_title: Option<String>,
    /// Retrieval relevance score
    #[serde(default)]
    pub score: Option<f64>,
    /// Link to the source text
    #[serde(default)]
    pub url: Option<String>,
    /// The snippet that was used as context
    #[serde(default)]
    pub content_snippet: Option<String>,
}

/// One turn in a conversation
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Local id until the server confirms a durable one
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content; grows incrementally for a streaming assistant turn
    pub content: String,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
    /// Owning conversation; a sentinel until the backend confirms one
    pub conversation_id: String,
    /// Retrieval sources, populated only for assistant messages
    pub sources: Vec<Source>,
    /// True only for an assistant placeholder still awaiting content
    pub is_loading: bool,
}

impl Message {
    /// Create an optimistic user message
    #[must_use]
    pub fn user(content: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            id: MessageId::local_user(),
            role: MessageRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            conversation_id: conversation_id.into(),
            sources: Vec::new(),
            is_loading: false,
        }
    }

    /// Create an assistant placeholder awaiting content
    #[must_use]
    pub fn placeholder(conversation_id: impl Into<String>) -> Self {
        Self {
            id: MessageId::local_assistant(),
            role: MessageRole::Assistant,
            content: String::new(),
            timestamp: Utc::now(),
            conversation_id: conversation_id.into(),
            sources: Vec::new(),
            is_loading: true,
        }
    }

    /// Append streamed content to this message
    pub fn append(&mut self, text: &str) {
        self.content.push_str(text);
    }
}

/// A conversation summary, as listed in the sidebar
#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    /// Durable backend id
    pub id: ConversationId,
    /// Conversation title
    pub title: String,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation last changed, if the backend reported it
    pub updated_at: Option<DateTime<Utc>>,
}
