//! Wire events for the realtime conversation protocol
//!
//! Both directions are JSON objects discriminated by a `type` field.
//! Unknown inbound event types deserialize to [`ServerEvent::Unknown`]
//! and are dropped by the client, never surfaced as failures.

use serde::{Deserialize, Serialize};

use voicebridge_config::{TurnDetectionMode, UpstreamConfig};

/// Messages sent to the conversation service.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Configure the session; always the first message on the wire.
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Inject a user- or system-authored text turn.
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    /// Trigger generation of the next agent response.
    #[serde(rename = "response.create")]
    ResponseCreate,

    /// Cancel the in-flight response.
    #[serde(rename = "response.cancel")]
    ResponseCancel,

    /// Forward caller audio (base64, same companded encoding as the
    /// telephone network).
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    /// Commit the input buffer to force transcription.
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,
}

/// Events received from the conversation service.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated,

    #[serde(rename = "session.updated")]
    SessionUpdated,

    #[serde(rename = "response.created")]
    ResponseCreated,

    /// A chunk of synthesized agent audio (base64).
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta { delta: String },

    #[serde(rename = "response.audio.done")]
    ResponseAudioDone,

    /// Text rendering of the synthesized agent turn.
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone { transcript: String },

    #[serde(rename = "response.done")]
    ResponseDone,

    #[serde(rename = "response.cancelled")]
    ResponseCancelled,

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// Recognized text of a completed caller utterance.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted { transcript: String },

    #[serde(rename = "error")]
    Error { error: ErrorDetail },

    /// Any event type this bridge does not handle.
    #[serde(other)]
    Unknown,
}

/// Error payload from the service.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Session handshake configuration.
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    pub modalities: Vec<String>,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub voice: String,
    pub instructions: String,
    pub max_response_output_tokens: u32,
    /// `None` serializes as `null`, disabling provider turn detection.
    pub turn_detection: Option<TurnDetection>,
    pub input_audio_transcription: Option<TranscriptionConfig>,
}

impl SessionConfig {
    pub fn from_settings(config: &UpstreamConfig) -> Self {
        Self {
            modalities: vec!["text".to_string(), "audio".to_string()],
            input_audio_format: "g711_ulaw".to_string(),
            output_audio_format: "g711_ulaw".to_string(),
            voice: config.voice.clone(),
            instructions: config.instructions.clone(),
            max_response_output_tokens: config.max_response_output_tokens,
            turn_detection: match config.turn_detection {
                TurnDetectionMode::ServerVad => Some(TurnDetection {
                    kind: "server_vad".to_string(),
                }),
                TurnDetectionMode::Disabled => None,
            },
            input_audio_transcription: Some(TranscriptionConfig {
                model: "whisper-1".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionConfig {
    pub model: String,
}

/// One conversation item injected by the bridge.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<ContentPart>,
}

impl ConversationItem {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::message("user", text)
    }

    pub fn system_text(text: impl Into<String>) -> Self {
        Self::message("system", text)
    }

    fn message(role: &str, text: impl Into<String>) -> Self {
        Self {
            kind: "message".to_string(),
            role: role.to_string(),
            content: vec![ContentPart {
                kind: "input_text".to_string(),
                text: text.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_tags() {
        let json = serde_json::to_value(&ClientEvent::ResponseCreate).unwrap();
        assert_eq!(json["type"], "response.create");

        let json = serde_json::to_value(&ClientEvent::InputAudioBufferAppend {
            audio: "AAAA".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "input_audio_buffer.append");
        assert_eq!(json["audio"], "AAAA");
    }

    #[test]
    fn test_conversation_item_shape() {
        let item = ConversationItem::user_text("what's the price");
        let json = serde_json::to_value(&ClientEvent::ConversationItemCreate { item }).unwrap();
        assert_eq!(json["item"]["role"], "user");
        assert_eq!(json["item"]["content"][0]["type"], "input_text");
        assert_eq!(json["item"]["content"][0]["text"], "what's the price");
    }

    #[test]
    fn test_server_event_parse() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"response.audio.delta","response_id":"r1","delta":"c2lsZW5jZQ=="}"#,
        )
        .unwrap();
        match event {
            ServerEvent::ResponseAudioDelta { delta } => assert_eq!(delta, "c2lsZW5jZQ=="),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_server_event() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"rate_limits.updated","rate_limits":[]}"#).unwrap();
        assert!(matches!(event, ServerEvent::Unknown));
    }

    #[test]
    fn test_turn_detection_null_when_disabled() {
        let mut config = UpstreamConfig::default();
        config.turn_detection = TurnDetectionMode::Disabled;
        let session = SessionConfig::from_settings(&config);
        let json = serde_json::to_value(&session).unwrap();
        assert!(json["turn_detection"].is_null());
        assert_eq!(json["input_audio_format"], "g711_ulaw");
    }
}
