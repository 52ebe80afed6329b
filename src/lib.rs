//! Ziryab Core - Headless Conversational Client
//!
//! UI-agnostic core for a retrieval-augmented chat service. Everything a
//! chat surface needs lives here: the transport client for the chat
//! backend, the event-stream decoding pipeline, and the conversation
//! session state machine with optimistic messages and id reconciliation.
//! Surfaces (terminal, desktop, web) render session state and forward
//! input; they contain no protocol or conversation logic.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │                   UI Surface                   │
//! │        (renders state, forwards input)         │
//! └───────────────────────┬────────────────────────┘
//!                         │
//! ┌───────────────────────▼────────────────────────┐
//! │            ChatSession (session.rs)            │
//! │   messages, flags, optimistic ids, reconcile   │
//! └───────────────────────┬────────────────────────┘
//!                         │ ServerEvent feed
//! ┌───────────────────────▼────────────────────────┐
//! │        ChatBackend trait (client/traits)       │
//! │     HttpBackend (client/http) in production    │
//! └───────────────────────┬────────────────────────┘
//!                         │ bytes
//! ┌───────────────────────▼────────────────────────┐
//! │   SseParser (sse.rs) → decode_record (stream)  │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ziryab_core::{AuthSession, ChatSession, Config, HttpBackend};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let backend = Arc::new(HttpBackend::new(&config.client, AuthSession::anonymous()));
//! let mut session = ChatSession::new(backend, config.session);
//!
//! session.send_message("What does al-Ghazali say about ihsan?", true).await;
//! session.run_until_idle().await;
//!
//! for message in session.messages() {
//!     println!("{}", message.content);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod messages;
pub mod session;
pub mod sse;
pub mod stream;

pub use auth::AuthSession;
pub use client::{ChatBackend, ExchangeHandle, HttpBackend, ResponseMode, SendRequest};
pub use config::{ClientConfig, Config, ConfigError, SessionConfig};
pub use error::ClientError;
pub use messages::{Conversation, ConversationId, Message, MessageId, MessageRole, Source};
pub use session::ChatSession;
pub use stream::ServerEvent;
