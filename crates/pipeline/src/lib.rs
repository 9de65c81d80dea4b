//! Real-time call pipeline
//!
//! The latency-sensitive core of the bridge: the barge-in detector that
//! decides from inbound caller audio whether synthesized speech is being
//! interrupted, and the per-call turn state machine that owns every
//! session flag and drives cancellation and turn injection.

pub mod barge_in;
pub mod session;

pub use barge_in::{
    interrupter_for, BargeContext, EnergyThresholdInterrupter, Interrupter,
    ProviderSignalInterrupter,
};
pub use session::{CallSession, CallState, Command, TelephonyEvent};
