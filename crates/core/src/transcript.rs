//! Conversation transcript types

use serde::{Deserialize, Serialize};

/// Who produced a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Caller,
    Agent,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Caller => "Caller",
            Speaker::Agent => "Agent",
        }
    }
}

/// One recognized utterance or synthesized response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub speaker: Speaker,
    pub text: String,
}

/// Ordered sequence of transcript lines for one call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    lines: Vec<TranscriptLine>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_caller(&mut self, text: impl Into<String>) {
        self.push(Speaker::Caller, text);
    }

    pub fn push_agent(&mut self, text: impl Into<String>) {
        self.push(Speaker::Agent, text);
    }

    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        let text = text.into();
        let text = text.trim();
        if !text.is_empty() {
            self.lines.push(TranscriptLine {
                speaker,
                text: text.to_string(),
            });
        }
    }

    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Full transcript, one speaker-prefixed line per utterance.
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(|line| format!("{}: {}", line.speaker.label(), line.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
