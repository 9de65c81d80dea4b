//! Telephony gateway wire frames
//!
//! The gateway speaks JSON over one persistent WebSocket per call:
//! `start`, `media` and `stop` inbound; `media` and `clear` outbound,
//! each tagged with the stream identifier. Unrecognized events decode to
//! [`GatewayInbound::Unknown`] and are dropped by the bridge loop.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Frames received from the telephony gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GatewayInbound {
    /// Handshake frame preceding `start`.
    Connected,
    Start {
        start: StartMeta,
    },
    Media {
        media: MediaMeta,
    },
    Stop,
    #[serde(other)]
    Unknown,
}

/// Stream metadata carried by the `start` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct StartMeta {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid")]
    pub call_sid: String,
    /// Parameters injected by the call-initiation answer, e.g. the
    /// caller's number.
    #[serde(default, rename = "customParameters")]
    pub custom_parameters: HashMap<String, String>,
}

impl StartMeta {
    /// Caller phone number, when the telephony metadata supplied one.
    pub fn caller(&self) -> Option<String> {
        self.custom_parameters
            .get("caller")
            .or_else(|| self.custom_parameters.get("from"))
            .cloned()
    }
}

/// Audio payload carried by a `media` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaMeta {
    /// Track label; only caller audio is bridged.
    #[serde(default)]
    pub track: Option<String>,
    /// Base64 mu-law audio.
    pub payload: String,
}

impl MediaMeta {
    pub fn is_inbound(&self) -> bool {
        self.track.as_deref().map_or(true, |track| track == "inbound")
    }
}

/// Frames sent to the telephony gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GatewayOutbound {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaPayload {
    pub payload: String,
}

impl GatewayOutbound {
    pub fn media(stream_sid: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::Media {
            stream_sid: stream_sid.into(),
            media: MediaPayload {
                payload: payload.into(),
            },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        Self::Clear {
            stream_sid: stream_sid.into(),
        }
    }
}
