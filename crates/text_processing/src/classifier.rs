//! Transcript Classification
//!
//! Decides whether a recognized utterance is backchannel filler, looks
//! like a question, or is a strong question worth interrupting the
//! agent for. The vocabularies are deployment data (mixed spoken
//! languages), supplied through [`ClassifierConfig`].

use std::collections::HashSet;

use voicebridge_config::ClassifierConfig;

/// Heuristic classifier for recognized caller utterances.
#[derive(Debug, Clone)]
pub struct TranscriptClassifier {
    fillers: HashSet<String>,
    starters: HashSet<String>,
    markers: Vec<String>,
    min_question_chars: usize,
    max_filler_words: usize,
}

impl TranscriptClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            fillers: config.filler_words.iter().map(|w| w.to_lowercase()).collect(),
            starters: config
                .question_starters
                .iter()
                .map(|w| w.to_lowercase())
                .collect(),
            markers: config.domain_markers.iter().map(|w| w.to_lowercase()).collect(),
            min_question_chars: config.min_question_chars,
            max_filler_words: config.max_filler_words,
        }
    }

    /// True if the utterance carries no content beyond backchannel
    /// filler: empty, or a handful of words all drawn from the filler
    /// vocabulary.
    pub fn is_filler_only(&self, text: &str) -> bool {
        let normalized = normalize(text);
        let words: Vec<&str> = normalized.split_whitespace().collect();

        if words.is_empty() {
            return true;
        }
        if words.len() > self.max_filler_words {
            return false;
        }
        words
            .iter()
            .all(|word| self.fillers.contains(word.trim_end_matches("'s")))
    }

    /// True if the utterance reads as a question: a question mark, an
    /// interrogative/auxiliary first word, or a domain marker phrase.
    pub fn looks_like_question(&self, text: &str) -> bool {
        if text.contains('?') {
            return true;
        }

        let normalized = normalize(text);
        if let Some(first) = normalized.split_whitespace().next() {
            let bare = first.trim_end_matches("'s");
            if self.starters.contains(bare) {
                return true;
            }
        }

        self.markers.iter().any(|marker| normalized.contains(marker))
    }

    /// [`looks_like_question`](Self::looks_like_question) gated by a
    /// minimum content length, so a two-word fragment is not treated as
    /// an intentional query.
    pub fn is_strong_question(&self, text: &str) -> bool {
        let normalized = normalize(text);
        normalized.chars().count() >= self.min_question_chars && self.looks_like_question(text)
    }
}

/// Lowercase and strip punctuation, keeping in-word apostrophes so
/// contractions ("what's") stay recognizable.
fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '\'' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
