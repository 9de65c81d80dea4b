//! Upstream Conversation Client
//!
//! Maintains exactly one persistent streaming connection per call to the
//! remote conversational speech service. A connection error or
//! unexpected close ends the call session; no reconnection is attempted
//! within a call, because an in-progress phone call cannot be resumed on
//! a fresh connection without re-establishing audio sync.

pub mod client;
pub mod events;

pub use client::{LinkState, UpstreamClient, UpstreamHandle};
pub use events::{
    ClientEvent, ContentPart, ConversationItem, ErrorDetail, ServerEvent, SessionConfig,
};

use thiserror::Error;

/// Upstream client errors
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid authorization header")]
    InvalidHeader,

    #[error("connection closed")]
    Closed,
}
