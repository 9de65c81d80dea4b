//! Core types for the voice bridge
//!
//! This crate provides foundational types used across all other crates:
//! - Telephony audio decoding and frame energy
//! - Lead field collection
//! - Conversation transcript types

pub mod audio;
pub mod lead;
pub mod transcript;

pub use audio::{decode_mulaw_sample, encode_mulaw_sample, frame_energy_db, AudioFrame, ENERGY_FLOOR_DB};
pub use lead::{LeadField, LeadSheet};
pub use transcript::{Speaker, Transcript, TranscriptLine};
