//! Configuration for the voice bridge
//!
//! Layered settings: serde defaults, then an optional TOML file, then
//! `VOICEBRIDGE_`-prefixed environment variables.

pub mod settings;

pub use settings::{
    BargeInConfig, BargeStrategy, ClassifierConfig, ObservabilityConfig, ServerConfig, Settings,
    SinkConfig, TurnDetectionMode, UpstreamConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
