//! Barge-In Detection
//!
//! Decides, from inbound caller audio alone, whether the caller is
//! interrupting synthesized agent speech. The provider's own end-of-turn
//! signal may be too slow or disabled entirely, so deployments choose an
//! interruption strategy: local energy thresholding with hysteresis, or
//! the provider's speech-started event. Both honor the same contract:
//! fire at most once per barge episode.

use std::time::{Duration, Instant};

use voicebridge_config::{BargeInConfig, BargeStrategy};
use voicebridge_core::AudioFrame;

/// Session state the detector consumes. Snapshot taken per event by the
/// owning state machine.
#[derive(Debug, Clone, Copy)]
pub struct BargeContext {
    pub barge_enabled: bool,
    pub barge_in_progress: bool,
    pub agent_speaking_now: bool,
    pub agent_speech_started: Option<Instant>,
}

impl BargeContext {
    fn armed(&self) -> bool {
        self.barge_enabled && !self.barge_in_progress && self.agent_speaking_now
    }
}

/// Interruption strategy.
///
/// Contract: at most one `true` per barge episode; [`reset_episode`]
/// re-arms the detector once the episode resolves.
///
/// [`reset_episode`]: Interrupter::reset_episode
pub trait Interrupter: Send {
    /// Evaluate one inbound caller frame.
    fn on_inbound_frame(&mut self, frame: &AudioFrame, ctx: &BargeContext) -> bool;

    /// Evaluate a provider-side speech-started signal.
    fn on_provider_speech_started(&mut self, ctx: &BargeContext) -> bool;

    /// Re-arm after a barge episode resolves.
    fn reset_episode(&mut self);
}

/// Select the configured strategy.
pub fn interrupter_for(config: &BargeInConfig) -> Box<dyn Interrupter + Send> {
    match config.strategy {
        BargeStrategy::Energy => Box::new(EnergyThresholdInterrupter::new(config.clone())),
        BargeStrategy::Provider => Box::new(ProviderSignalInterrupter::new()),
    }
}

/// Local energy-based detection with hysteresis.
///
/// A single noisy frame must not cancel agent speech; requiring
/// consecutive frames above the threshold filters transient clicks while
/// keeping latency to roughly two frame periods.
pub struct EnergyThresholdInterrupter {
    config: BargeInConfig,
    consecutive: u32,
    fired: bool,
}

impl EnergyThresholdInterrupter {
    pub fn new(config: BargeInConfig) -> Self {
        Self {
            config,
            consecutive: 0,
            fired: false,
        }
    }

    pub fn consecutive_frames(&self) -> u32 {
        self.consecutive
    }
}

impl Interrupter for EnergyThresholdInterrupter {
    fn on_inbound_frame(&mut self, frame: &AudioFrame, ctx: &BargeContext) -> bool {
        if self.fired || !ctx.armed() {
            self.consecutive = 0;
            return false;
        }

        // Skip the tail of the agent's own audio bleeding into the loop.
        if let Some(started) = ctx.agent_speech_started {
            let since_start = frame.received_at.saturating_duration_since(started);
            if since_start < Duration::from_millis(self.config.grace_ms) {
                return false;
            }
        }

        if frame.energy_db > self.config.energy_threshold_db {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
            return false;
        }

        if self.consecutive >= self.config.consecutive_frames {
            self.consecutive = 0;
            self.fired = true;
            return true;
        }

        false
    }

    fn on_provider_speech_started(&mut self, _ctx: &BargeContext) -> bool {
        // This strategy trusts local energy only.
        false
    }

    fn reset_episode(&mut self) {
        self.fired = false;
        self.consecutive = 0;
    }
}

/// Provider-signal strategy: fires on the upstream speech-started event
/// under the same gating, ignoring frame energy.
pub struct ProviderSignalInterrupter {
    fired: bool,
}

impl ProviderSignalInterrupter {
    pub fn new() -> Self {
        Self { fired: false }
    }
}

impl Default for ProviderSignalInterrupter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupter for ProviderSignalInterrupter {
    fn on_inbound_frame(&mut self, _frame: &AudioFrame, _ctx: &BargeContext) -> bool {
        false
    }

    fn on_provider_speech_started(&mut self, ctx: &BargeContext) -> bool {
        if self.fired || !ctx.armed() {
            return false;
        }
        self.fired = true;
        true
    }

    fn reset_episode(&mut self) {
        self.fired = false;
    }
}
