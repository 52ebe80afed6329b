//! Wire Format
//!
//! Serde mirrors of the backend's JSON payloads, kept separate from the
//! crate's own data model so backend field-naming quirks (like the `$id`
//! key on conversation documents) stay contained here. Conversions into
//! [`crate::messages`] types live next to the payloads they convert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::{Conversation, ConversationId, Message, MessageId, MessageRole, Source};

/// One prior turn, as sent in an anonymous request body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// `"user"` or `"assistant"`
    pub role: String,
    /// The turn's full text
    pub content: String,
}

impl HistoryEntry {
    /// Build an entry from a completed local message
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self {
            role: match message.role {
                MessageRole::User => "user".to_string(),
                MessageRole::Assistant => "assistant".to_string(),
            },
            content: message.content.clone(),
        }
    }
}

/// Complete (non-streaming) response to a chat message
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    /// The assistant's full answer
    pub ai_response: String,
    /// Retrieval sources backing the answer
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Durable conversation id; absent on anonymous exchanges
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Durable id for the user message; absent on anonymous exchanges
    #[serde(default)]
    pub user_message_id: Option<String>,
    /// Durable id for the assistant message; absent on anonymous exchanges
    #[serde(default)]
    pub ai_message_id: Option<String>,
}

/// Response to a history fetch
#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    /// The conversation's messages, in whatever order the backend returned
    pub messages: Vec<BackendMessage>,
}

/// A persisted message, as the backend stores it
#[derive(Debug, Deserialize)]
pub struct BackendMessage {
    /// Durable message id
    pub message_id: String,
    /// Owning conversation
    pub conversation_id: String,
    /// Message text
    pub content: String,
    /// `"user"` or `"ai"`
    pub message_type: String,
    /// ISO-8601 creation time
    pub timestamp: String,
    /// Retrieval sources, present only on assistant messages
    #[serde(default)]
    pub sources: Option<Vec<Source>>,
}

impl BackendMessage {
    /// Convert into the local data model
    ///
    /// Unknown `message_type` values are treated as assistant turns so the
    /// content is still shown rather than dropped.
    #[must_use]
    pub fn into_message(self) -> Message {
        let role = match self.message_type.as_str() {
            "user" => MessageRole::User,
            "ai" => MessageRole::Assistant,
            other => {
                tracing::warn!(message_type = %other, "unknown message type in history");
                MessageRole::Assistant
            }
        };
        Message {
            id: MessageId(self.message_id),
            role,
            content: self.content,
            timestamp: parse_timestamp(&self.timestamp),
            conversation_id: self.conversation_id,
            sources: self.sources.unwrap_or_default(),
            is_loading: false,
        }
    }
}

/// Response to a conversation-list fetch
#[derive(Debug, Deserialize)]
pub struct ConversationsResponse {
    /// The caller's conversations
    pub conversations: Vec<BackendConversation>,
}

/// A conversation document, as the backend stores it
#[derive(Debug, Deserialize)]
pub struct BackendConversation {
    /// Durable conversation id; the backend's document store exposes it
    /// under `$id`
    #[serde(rename = "$id")]
    pub id: String,
    /// Conversation title
    pub title: String,
    /// ISO-8601 creation time
    pub created_at: String,
    /// ISO-8601 last-change time, when tracked
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl BackendConversation {
    /// Convert into the local data model
    #[must_use]
    pub fn into_conversation(self) -> Conversation {
        Conversation {
            id: ConversationId(self.id),
            title: self.title,
            created_at: parse_timestamp(&self.created_at),
            updated_at: self.last_updated.as_deref().map(parse_timestamp),
        }
    }
}

/// Response to a conversation create
#[derive(Debug, Deserialize)]
pub struct CreateConversationResponse {
    /// Durable id of the new conversation
    pub conversation_id: String,
}

/// Login request body
#[derive(Debug, Serialize)]
pub struct LoginBody {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
}

/// Successful login response
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    /// Bearer token for subsequent requests
    pub access_token: String,
}

/// Registration request body
#[derive(Debug, Serialize)]
pub struct RegisterBody {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
    /// Display name
    pub name: String,
}

/// Parse an ISO-8601 timestamp, falling back to now on garbage
///
/// History rendering should degrade to a wrong time, not a dropped
/// message.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(e) => {
            tracing::warn!(raw = %raw, error = %e, "unparseable backend timestamp");
            Utc::now()
        }
    }
}
