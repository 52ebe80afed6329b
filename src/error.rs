//! Client Error Taxonomy
//!
//! Every failure the transport layer can report. The session state machine
//! catches these at its boundary and converts them into the user-visible
//! `error` field; they never propagate into a UI layer as panics.

use thiserror::Error;

/// Errors from the transport client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network-level failure (connection refused, timeout, body read)
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response; `detail` is extracted from the JSON body's
    /// `detail`/`message` field when parseable, otherwise the status text
    #[error("server returned {status}: {detail}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Best-effort message extracted from the response body
        detail: String,
    },

    /// Operation requires a bearer token and none is present
    #[error("authentication required")]
    AuthRequired,

    /// Response body did not match the expected wire shape
    #[error("invalid response payload: {0}")]
    Payload(#[from] serde_json::Error),
}
