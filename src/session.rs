//! Conversation Session State Machine
//!
//! Owns everything a chat surface renders: the message list, the active
//! conversation id, sending/loading flags, and the latest user-visible
//! error. The session is UI-agnostic and backend-generic; it holds an
//! `Arc<B: ChatBackend>` and advances by draining backend events.
//!
//! # Optimistic Messages
//!
//! Sending pushes a user message and an assistant placeholder immediately,
//! under locally generated ids (and a `temp-conv-*` sentinel conversation
//! when no conversation exists yet). Backend confirmations rewrite the ids
//! in place; the UI keeps rendering the same list throughout.
//!
//! # Driving the Session
//!
//! Two ways to advance:
//! - [`ChatSession::poll_events`] drains whatever is ready without
//!   blocking, for a render-loop host
//! - [`ChatSession::run_until_idle`] awaits until the active exchange and
//!   any history load finish, for tests and batch callers

use std::sync::Arc;

use futures::future::{AbortHandle, Abortable};
use tokio::sync::{mpsc, oneshot};

use crate::client::traits::{ChatBackend, SendRequest};
use crate::client::wire::HistoryEntry;
use crate::config::SessionConfig;
use crate::error::ClientError;
use crate::messages::{ConversationId, Message, MessageId};
use crate::stream::ServerEvent;

/// Rewrite every message under a sentinel conversation id to the confirmed
/// durable id
///
/// Idempotent: once rewritten, nothing matches the sentinel anymore.
pub fn reconcile_conversation(messages: &mut [Message], sentinel: &str, confirmed: &str) {
    for message in messages
        .iter_mut()
        .filter(|m| m.conversation_id == sentinel)
    {
        message.conversation_id = confirmed.to_string();
    }
}

/// State for the in-flight exchange
struct ActiveExchange {
    /// Event feed from the backend
    events: mpsc::UnboundedReceiver<ServerEvent>,
    /// Aborts the underlying request
    abort: AbortHandle,
    /// Current id of this exchange's user message (local until confirmed)
    user_message_id: MessageId,
    /// Current id of this exchange's assistant placeholder
    placeholder_id: MessageId,
    /// Sentinel conversation id awaiting confirmation, if any
    sentinel: Option<String>,
    /// Whether any event has arrived yet; decides what cancel keeps
    received_any: bool,
}

/// State for an in-flight history load
struct HistoryLoad {
    /// Resolves with the fetched messages
    result: oneshot::Receiver<Result<Vec<Message>, ClientError>>,
    /// Aborts the underlying request
    abort: AbortHandle,
}

/// A conversation session over a chat backend
pub struct ChatSession<B: ChatBackend + 'static> {
    /// The transport (or a test mock)
    backend: Arc<B>,
    /// Behavior settings
    config: SessionConfig,
    /// Messages of the active conversation, oldest first
    messages: Vec<Message>,
    /// Active conversation; `None` before the first send of a new chat
    current_conversation_id: Option<ConversationId>,
    /// True from send until the exchange ends, however it ends
    is_sending: bool,
    /// True while a history fetch is in flight
    is_loading_history: bool,
    /// Latest user-visible error, cleared on the next send or selection
    error: Option<String>,
    exchange: Option<ActiveExchange>,
    history_load: Option<HistoryLoad>,
}

impl<B: ChatBackend + 'static> ChatSession<B> {
    /// Create a session over `backend`
    pub fn new(backend: Arc<B>, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            messages: Vec::new(),
            current_conversation_id: None,
            is_sending: false,
            is_loading_history: false,
            error: None,
            exchange: None,
            history_load: None,
        }
    }

    /// Messages of the active conversation, oldest first
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Active conversation id (may be a local sentinel)
    #[must_use]
    pub fn current_conversation_id(&self) -> Option<&ConversationId> {
        self.current_conversation_id.as_ref()
    }

    /// Whether an exchange is in flight
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.is_sending
    }

    /// Whether a history load is in flight
    #[must_use]
    pub fn is_loading_history(&self) -> bool {
        self.is_loading_history
    }

    /// Latest user-visible error, if any
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Send a user message
    ///
    /// Blank input is ignored. If an exchange is already in flight it is
    /// cancelled first; the new send wins. The optimistic user message and
    /// assistant placeholder are visible in [`ChatSession::messages`] as
    /// soon as this returns.
    pub async fn send_message(&mut self, content: &str, use_rag: bool) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }

        if self.is_sending {
            tracing::debug!("cancelling in-flight exchange for a new send");
            self.cancel();
        }
        self.error = None;

        // Context for a stateless (anonymous) backend: recent completed
        // turns, captured before the optimistic pair is pushed.
        let history = self.recent_history();

        // Durable id goes on the wire; a sentinel never does.
        let request_conversation = self
            .current_conversation_id
            .clone()
            .filter(|id| !id.is_sentinel());

        let conversation_string = match &self.current_conversation_id {
            Some(id) => id.0.clone(),
            None => {
                let sentinel = ConversationId::sentinel();
                let string = sentinel.0.clone();
                self.current_conversation_id = Some(sentinel);
                string
            }
        };
        let sentinel = self
            .current_conversation_id
            .as_ref()
            .filter(|id| id.is_sentinel())
            .map(|id| id.0.clone());

        let user = Message::user(content, conversation_string.clone());
        let placeholder = Message::placeholder(conversation_string);
        let user_message_id = user.id.clone();
        let placeholder_id = placeholder.id.clone();
        self.messages.push(user);
        self.messages.push(placeholder);
        self.is_sending = true;

        let request = SendRequest {
            content: content.to_string(),
            use_rag,
            conversation_id: request_conversation,
            history,
            mode: self.config.response_mode,
        };

        match self.backend.send_message(request).await {
            Ok(handle) => {
                self.exchange = Some(ActiveExchange {
                    events: handle.events,
                    abort: handle.abort,
                    user_message_id,
                    placeholder_id,
                    sentinel,
                    received_any: false,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "exchange failed to start");
                self.error = Some(e.to_string());
                let notice = self.config.failure_notice.clone();
                if let Some(message) = self.message_mut(&placeholder_id) {
                    message.content = notice;
                    message.is_loading = false;
                }
                self.is_sending = false;
            }
        }
    }

    /// Drain all ready backend events without blocking
    ///
    /// Returns true when session state changed, so a render loop knows to
    /// redraw.
    pub fn poll_events(&mut self) -> bool {
        let mut changed = false;

        loop {
            let Some(exchange) = self.exchange.as_mut() else {
                break;
            };
            match exchange.events.try_recv() {
                Ok(event) => {
                    self.apply_event(event);
                    changed = true;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.finish_exchange();
                    changed = true;
                    break;
                }
            }
        }

        changed |= self.poll_history();
        changed
    }

    /// Await until the active exchange and any history load complete
    pub async fn run_until_idle(&mut self) {
        loop {
            if let Some(load) = self.history_load.as_mut() {
                let result = (&mut load.result).await;
                self.finish_history_load(result.ok());
                continue;
            }

            let Some(exchange) = self.exchange.as_mut() else {
                break;
            };
            match exchange.events.recv().await {
                Some(event) => self.apply_event(event),
                None => self.finish_exchange(),
            }
        }
    }

    /// Cancel the in-flight exchange and history load, if any
    ///
    /// If the exchange never produced an event the optimistic pair is
    /// removed; once anything arrived, the partial response is kept and
    /// finalized.
    pub fn cancel(&mut self) {
        if let Some(exchange) = self.exchange.take() {
            exchange.abort.abort();
            if exchange.received_any {
                if let Some(message) = self.message_mut(&exchange.placeholder_id) {
                    message.is_loading = false;
                }
            } else {
                self.messages.retain(|m| {
                    m.id != exchange.user_message_id && m.id != exchange.placeholder_id
                });
            }
        }
        self.is_sending = false;

        if let Some(load) = self.history_load.take() {
            load.abort.abort();
        }
        self.is_loading_history = false;
    }

    /// Switch to another conversation (or `None` for a fresh chat)
    ///
    /// Cancels anything in flight, clears the message list, and starts a
    /// history load for a durable id. Returns immediately; the history
    /// arrives through [`ChatSession::poll_events`] or
    /// [`ChatSession::run_until_idle`].
    pub fn select_conversation(&mut self, id: Option<ConversationId>) {
        self.cancel();
        self.messages.clear();
        self.error = None;
        self.current_conversation_id = id.clone();

        let Some(id) = id.filter(|id| !id.is_sentinel()) else {
            return;
        };

        tracing::debug!(conversation = %id, "loading history");
        let backend = Arc::clone(&self.backend);
        let (tx, rx) = oneshot::channel();
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let fetch = async move {
            let _ = tx.send(backend.fetch_history(&id).await);
        };
        tokio::spawn(Abortable::new(fetch, abort_registration));

        self.history_load = Some(HistoryLoad {
            result: rx,
            abort: abort_handle,
        });
        self.is_loading_history = true;
    }

    /// Clear the message list and error without leaving the conversation
    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.error = None;
    }

    /// Recent completed turns for anonymous request context
    fn recent_history(&self) -> Vec<HistoryEntry> {
        let completed: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| !m.is_loading && !m.content.is_empty())
            .collect();
        let skip = completed.len().saturating_sub(self.config.anonymous_history_limit);
        completed[skip..]
            .iter()
            .map(|m| HistoryEntry::from_message(m))
            .collect()
    }

    fn message_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == *id)
    }

    /// Apply one backend event to session state
    fn apply_event(&mut self, event: ServerEvent) {
        let Some(exchange) = self.exchange.as_mut() else {
            return;
        };
        exchange.received_any = true;
        let user_message_id = exchange.user_message_id.clone();
        let placeholder_id = exchange.placeholder_id.clone();

        match event {
            ServerEvent::Chunk { token } => {
                if let Some(message) = self.message_mut(&placeholder_id) {
                    message.append(&token);
                    message.is_loading = false;
                }
            }
            ServerEvent::Sources(sources) => {
                if let Some(message) = self.message_mut(&placeholder_id) {
                    message.sources = sources;
                }
            }
            ServerEvent::ConversationConfirmed(id) => {
                let sentinel = self.exchange.as_mut().and_then(|ex| ex.sentinel.take());
                if let Some(sentinel) = sentinel {
                    reconcile_conversation(&mut self.messages, &sentinel, &id.0);
                }
                // Backfill the exchange's own pair even without a sentinel.
                for message_id in [&user_message_id, &placeholder_id] {
                    if let Some(message) = self.message_mut(message_id) {
                        message.conversation_id = id.0.clone();
                    }
                }
                self.current_conversation_id = Some(id);
            }
            ServerEvent::UserMessageConfirmed(id) => {
                if let Some(message) = self.message_mut(&user_message_id) {
                    message.id = id.clone();
                }
                if let Some(ex) = self.exchange.as_mut() {
                    ex.user_message_id = id;
                }
            }
            ServerEvent::AssistantMessageConfirmed(id) => {
                if let Some(message) = self.message_mut(&placeholder_id) {
                    message.id = id.clone();
                }
                if let Some(ex) = self.exchange.as_mut() {
                    ex.placeholder_id = id;
                }
            }
            ServerEvent::Error { detail } => {
                tracing::warn!(detail = %detail, "exchange reported an error");
                if let Some(message) = self.message_mut(&placeholder_id) {
                    // Keep any partial response; only an empty placeholder
                    // shows the error text itself.
                    if message.content.is_empty() {
                        message.content = detail.clone();
                    }
                    message.is_loading = false;
                }
                self.error = Some(detail);
                if let Some(ex) = self.exchange.take() {
                    ex.abort.abort();
                }
                self.is_sending = false;
            }
            ServerEvent::End => self.finish_exchange(),
        }
    }

    /// Finalize the exchange after a normal end or disconnection
    fn finish_exchange(&mut self) {
        let notice = self.config.failure_notice.clone();
        if let Some(exchange) = self.exchange.take() {
            if let Some(message) = self.message_mut(&exchange.placeholder_id) {
                message.is_loading = false;
                if message.content.is_empty() {
                    message.content = notice;
                }
            }
        }
        self.is_sending = false;
    }

    fn poll_history(&mut self) -> bool {
        let Some(load) = self.history_load.as_mut() else {
            return false;
        };
        match load.result.try_recv() {
            Ok(result) => {
                self.finish_history_load(Some(result));
                true
            }
            Err(oneshot::error::TryRecvError::Empty) => false,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.finish_history_load(None);
                true
            }
        }
    }

    /// Install a completed history load
    ///
    /// Loaded messages go before anything sent while the load was in
    /// flight. `None` means the load was aborted; nothing changes.
    fn finish_history_load(&mut self, result: Option<Result<Vec<Message>, ClientError>>) {
        self.history_load = None;
        self.is_loading_history = false;
        match result {
            Some(Ok(mut loaded)) => {
                tracing::debug!(count = loaded.len(), "history loaded");
                loaded.append(&mut self.messages);
                self.messages = loaded;
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "history load failed");
                self.error = Some(e.to_string());
            }
            None => {}
        }
    }
}
