//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// HTTP / WebSocket server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream conversation service configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Barge-in detection tuning
    #[serde(default)]
    pub barge_in: BargeInConfig,

    /// Transcript classification language data
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Lead datastore sink
    #[serde(default)]
    pub sink: SinkConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from an optional TOML file plus the environment.
    ///
    /// Environment variables are prefixed with `VOICEBRIDGE_` and nested
    /// with `__`, e.g. `VOICEBRIDGE_UPSTREAM__API_KEY`.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let raw = builder
            .add_source(Environment::with_prefix("VOICEBRIDGE").separator("__"))
            .build()?;

        let settings: Settings = raw.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.barge_in.consecutive_frames == 0 {
            return Err(ConfigError::InvalidValue {
                field: "barge_in.consecutive_frames".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.barge_in.energy_threshold_db >= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "barge_in.energy_threshold_db".to_string(),
                message: "must be below 0 dBFS".to_string(),
            });
        }
        if self.classifier.dedup_window_ms > 10_000 {
            return Err(ConfigError::InvalidValue {
                field: "classifier.dedup_window_ms".to_string(),
                message: "must be under 10 seconds".to_string(),
            });
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket path for the telephony audio stream
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Externally reachable host, used in the call-initiation answer
    #[serde(default = "default_public_host")]
    pub public_host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            public_host: default_public_host(),
        }
    }
}

/// Turn-detection policy requested from the upstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDetectionMode {
    /// Provider-side voice activity detection.
    ServerVad,
    /// No provider turn detection; the bridge drives turns itself.
    #[serde(rename = "none")]
    Disabled,
}

/// Upstream conversation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// WebSocket URL of the realtime conversation endpoint
    #[serde(default = "default_upstream_url")]
    pub url: String,

    /// Bearer token; normally supplied via VOICEBRIDGE_UPSTREAM__API_KEY
    #[serde(default)]
    pub api_key: String,

    /// Synthesized voice identity
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Cap on generated response length, in tokens
    #[serde(default = "default_response_cap")]
    pub max_response_output_tokens: u32,

    /// System instructions for the conversational agent
    #[serde(default = "default_instructions")]
    pub instructions: String,

    /// Turn-detection policy
    #[serde(default = "default_turn_detection")]
    pub turn_detection: TurnDetectionMode,

    /// Greeting the agent speaks when the call connects
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            api_key: String::new(),
            voice: default_voice(),
            max_response_output_tokens: default_response_cap(),
            instructions: default_instructions(),
            turn_detection: default_turn_detection(),
            greeting: default_greeting(),
        }
    }
}

/// Which interruption strategy a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BargeStrategy {
    /// Local energy-threshold detection over inbound frames.
    Energy,
    /// Provider speech-started signal.
    Provider,
}

/// Barge-in detection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BargeInConfig {
    /// Enable barge-in detection
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interruption strategy
    #[serde(default = "default_strategy")]
    pub strategy: BargeStrategy,

    /// Frame energy a caller must exceed to count as speech, in dBFS
    #[serde(default = "default_energy_threshold")]
    pub energy_threshold_db: f32,

    /// Consecutive qualifying frames before an interruption fires
    #[serde(default = "default_consecutive_frames")]
    pub consecutive_frames: u32,

    /// Grace window after agent speech starts, in milliseconds
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// How long after the last agent audio the agent still counts as
    /// speaking, in milliseconds
    #[serde(default = "default_hold_ms")]
    pub agent_audio_hold_ms: u64,
}

impl Default for BargeInConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: default_strategy(),
            energy_threshold_db: default_energy_threshold(),
            consecutive_frames: default_consecutive_frames(),
            grace_ms: default_grace_ms(),
            agent_audio_hold_ms: default_hold_ms(),
        }
    }
}

/// Transcript classification language data.
///
/// The filler and question vocabularies are deployment data, not code:
/// the supported spoken languages vary per installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Backchannel/filler vocabulary
    #[serde(default = "default_filler_words")]
    pub filler_words: Vec<String>,

    /// Interrogative and auxiliary sentence starters
    #[serde(default = "default_question_starters")]
    pub question_starters: Vec<String>,

    /// Domain phrases that mark an utterance as a real inquiry
    #[serde(default = "default_domain_markers")]
    pub domain_markers: Vec<String>,

    /// Minimum normalized length for a strong question, in characters
    #[serde(default = "default_min_question_chars")]
    pub min_question_chars: usize,

    /// Maximum word count for a filler-only utterance
    #[serde(default = "default_max_filler_words")]
    pub max_filler_words: usize,

    /// Window for suppressing duplicate transcription events, in ms
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            filler_words: default_filler_words(),
            question_starters: default_question_starters(),
            domain_markers: default_domain_markers(),
            min_question_chars: default_min_question_chars(),
            max_filler_words: default_max_filler_words(),
            dedup_window_ms: default_dedup_window_ms(),
        }
    }
}

/// Lead datastore sink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Endpoint the call record is POSTed to; unset disables persistence
    #[serde(default)]
    pub url: Option<String>,

    /// Bearer token for the datastore
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_sink_timeout")]
    pub timeout_seconds: u64,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub log_json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ws_path() -> String {
    "/media".to_string()
}

fn default_public_host() -> String {
    "localhost:8080".to_string()
}

fn default_upstream_url() -> String {
    "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview".to_string()
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_response_cap() -> u32 {
    1500
}

fn default_instructions() -> String {
    "You are a friendly receptionist for a small-business marketing agency. \
     Answer questions about pricing and services briefly, and collect the \
     caller's name, business and contact details when they offer them. Keep \
     responses short and conversational; this is a phone call."
        .to_string()
}

fn default_turn_detection() -> TurnDetectionMode {
    TurnDetectionMode::ServerVad
}

fn default_greeting() -> String {
    "Thanks for calling! How can I help you today?".to_string()
}

fn default_true() -> bool {
    true
}

fn default_strategy() -> BargeStrategy {
    BargeStrategy::Energy
}

fn default_energy_threshold() -> f32 {
    -50.0
}

fn default_consecutive_frames() -> u32 {
    2
}

fn default_grace_ms() -> u64 {
    120
}

fn default_hold_ms() -> u64 {
    350
}

fn default_filler_words() -> Vec<String> {
    [
        "uh", "um", "mm", "hmm", "mhm", "huh", "ah", "eh", "oh", "okay", "ok", "yeah", "yes",
        "yep", "no", "nope", "right", "sure", "cool", "alright", "fine", "thanks", "hello", "hi",
        "hey", "bye", "si", "vale", "bueno", "claro", "gracias", "hola",
    ]
    .iter()
    .map(|w| w.to_string())
    .collect()
}

fn default_question_starters() -> Vec<String> {
    [
        "who", "what", "when", "where", "why", "how", "which", "can", "could", "do", "does",
        "did", "is", "are", "was", "will", "would", "should", "may", "might", "que", "como",
        "cuanto", "cuando", "donde", "por",
    ]
    .iter()
    .map(|w| w.to_string())
    .collect()
}

fn default_domain_markers() -> Vec<String> {
    [
        "price", "pricing", "cost", "how much", "quote", "book", "booking", "appointment",
        "schedule", "available", "availability", "precio", "cuesta", "reservar", "cita",
    ]
    .iter()
    .map(|w| w.to_string())
    .collect()
}

fn default_min_question_chars() -> usize {
    12
}

fn default_max_filler_words() -> usize {
    4
}

fn default_dedup_window_ms() -> u64 {
    900
}

fn default_sink_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.barge_in.consecutive_frames, 2);
        assert_eq!(settings.classifier.dedup_window_ms, 900);
        assert_eq!(settings.barge_in.strategy, BargeStrategy::Energy);
    }

    #[test]
    fn test_invalid_consecutive_frames_rejected() {
        let mut settings = Settings::default();
        settings.barge_in.consecutive_frames = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut settings = Settings::default();
        settings.barge_in.energy_threshold_db = 3.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_turn_detection_serde_names() {
        let json = serde_json::to_string(&TurnDetectionMode::Disabled).unwrap();
        assert_eq!(json, "\"none\"");
        let json = serde_json::to_string(&TurnDetectionMode::ServerVad).unwrap();
        assert_eq!(json, "\"server_vad\"");
    }
}
