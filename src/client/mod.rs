//! Transport Client
//!
//! Everything that talks to the chat backend over HTTP: the [`ChatBackend`]
//! trait the session is generic over, the wire-format payload types, and
//! the production [`HttpBackend`] implementation.

pub mod http;
pub mod traits;
pub mod wire;

pub use http::HttpBackend;
pub use traits::{ChatBackend, ExchangeHandle, ResponseMode, SendRequest};
