//! Voice Bridge Server
//!
//! HTTP and WebSocket endpoints wiring the telephony audio gateway to
//! the upstream conversation service, one call session per stream.

pub mod bridge;
pub mod http;
pub mod state;
pub mod telephony;

pub use http::create_router;
pub use state::AppState;
