//! Authentication Session
//!
//! Explicit holder for the bearer token. The transport client is
//! constructed with an [`AuthSession`] value instead of reading a token
//! from ambient storage; whoever owns credential persistence (the UI shell)
//! refreshes or invalidates it here and every in-flight component observes
//! the change.
//!
//! Absence of a token means anonymous mode throughout the crate.

use std::sync::Arc;

use parking_lot::RwLock;

/// Shared, cloneable bearer-token holder
///
/// Clones share the same underlying token; refreshing one handle is
/// visible to all of them.
#[derive(Clone, Default)]
pub struct AuthSession {
    token: Arc<RwLock<Option<String>>>,
}

impl AuthSession {
    /// Create an anonymous session (no token)
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Create a session with an existing bearer token
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(Some(token.into()))),
        }
    }

    /// Current bearer token, if any
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Whether a token is present
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }

    /// Replace the token (e.g. after login or a refresh)
    pub fn refresh(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Drop the token, returning to anonymous mode
    pub fn invalidate(&self) {
        *self.token.write() = None;
    }
}

impl std::fmt::Debug for AuthSession {
    // Never print the token itself.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
