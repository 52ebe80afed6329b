//! Server Event Decoding
//!
//! Typed interpretation of the records the event-stream parser produces.
//! Every named event the backend emits maps to a [`ServerEvent`] variant;
//! everything the session state machine consumes flows through this one
//! enum, whether the transport streamed it or synthesized it from a
//! complete JSON response.

use serde::Deserialize;

use crate::messages::{ConversationId, MessageId, Source};
use crate::sse::SseRecord;

/// A typed event from the chat backend
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    /// A fragment of assistant response text
    Chunk {
        /// The text fragment, appended verbatim
        token: String,
    },
    /// Retrieval sources backing the in-progress answer; replaces any
    /// previously delivered set
    Sources(Vec<Source>),
    /// The backend assigned a durable id to the conversation
    ConversationConfirmed(ConversationId),
    /// The backend assigned a durable id to the optimistic user message
    UserMessageConfirmed(MessageId),
    /// The backend assigned a durable id to the assistant message
    AssistantMessageConfirmed(MessageId),
    /// The backend reported a failure mid-exchange
    Error {
        /// Human-readable failure description
        detail: String,
    },
    /// The exchange completed normally
    End,
}

#[derive(Deserialize)]
struct ChunkPayload {
    token: String,
}

#[derive(Deserialize)]
struct SourcesPayload {
    sources: Vec<Source>,
}

#[derive(Deserialize)]
struct ConversationIdPayload {
    conversation_id: String,
}

#[derive(Deserialize)]
struct MessageIdPayload {
    message_id: String,
    /// `"user"` or `"ai"`
    message_type: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    detail: String,
}

/// Decode one event-stream record into a typed event
///
/// Returns `None` for records the session has no use for: the `[DONE]`
/// sentinel (the `end` event already covers termination), unknown event
/// types, and payloads that fail to parse. A malformed payload is logged
/// and skipped rather than aborting the stream.
#[must_use]
pub fn decode_record(record: &SseRecord) -> Option<ServerEvent> {
    if record.data == "[DONE]" {
        return None;
    }

    match record.event.as_str() {
        "chunk" => match serde_json::from_str::<ChunkPayload>(&record.data) {
            Ok(payload) => Some(ServerEvent::Chunk {
                token: payload.token,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "malformed chunk payload, skipping");
                None
            }
        },
        "sources" => match serde_json::from_str::<SourcesPayload>(&record.data) {
            Ok(payload) => Some(ServerEvent::Sources(payload.sources)),
            Err(e) => {
                tracing::warn!(error = %e, "malformed sources payload, skipping");
                None
            }
        },
        "conversation_id" => match serde_json::from_str::<ConversationIdPayload>(&record.data) {
            Ok(payload) => Some(ServerEvent::ConversationConfirmed(ConversationId(
                payload.conversation_id,
            ))),
            Err(e) => {
                tracing::warn!(error = %e, "malformed conversation_id payload, skipping");
                None
            }
        },
        "message_id" => match serde_json::from_str::<MessageIdPayload>(&record.data) {
            Ok(payload) => {
                let id = MessageId(payload.message_id);
                match payload.message_type.as_str() {
                    "user" => Some(ServerEvent::UserMessageConfirmed(id)),
                    "ai" => Some(ServerEvent::AssistantMessageConfirmed(id)),
                    other => {
                        tracing::warn!(message_type = %other, "unknown message_id type, skipping");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed message_id payload, skipping");
                None
            }
        },
        "error" => {
            let detail = serde_json::from_str::<ErrorPayload>(&record.data)
                .map_or_else(|_| record.data.clone(), |payload| payload.detail);
            Some(ServerEvent::Error { detail })
        }
        "end" => Some(ServerEvent::End),
        other => {
            tracing::debug!(event = %other, "ignoring unknown event type");
            None
        }
    }
}
