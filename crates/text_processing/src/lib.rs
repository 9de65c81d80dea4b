//! Utterance classification and lead extraction
//!
//! Pure heuristics over recognized caller utterances. Nothing in this
//! crate performs I/O or fails: a pattern that does not match simply
//! leaves its field unset.

pub mod classifier;
pub mod leads;

pub use classifier::TranscriptClassifier;
pub use leads::{LeadExtractor, LeadMatches};
