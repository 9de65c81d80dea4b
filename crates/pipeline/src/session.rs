//! Call Session / Turn State Machine
//!
//! One `CallSession` per active call owns every piece of per-call state
//! and routes all mutation through its transition methods, keeping the
//! invariants (cancel-in-progress implies barge-in-progress, one cancel
//! in flight at a time, terminal state not re-enterable) checkable in
//! one place. Transitions are pure with respect to I/O: each returns the
//! commands the owning connection loop must execute, preserving the
//! single-threaded-per-session ordering guarantee.

use std::time::{Duration, Instant};

use voicebridge_config::Settings;
use voicebridge_core::{AudioFrame, LeadSheet, Transcript};
use voicebridge_text_processing::{LeadExtractor, TranscriptClassifier};
use voicebridge_upstream::{ClientEvent, ConversationItem, ServerEvent};

use crate::barge_in::{interrupter_for, BargeContext, Interrupter};

/// Typed events from the telephony peer, after wire decoding.
#[derive(Debug, Clone)]
pub enum TelephonyEvent {
    /// Caller audio payload (base64 mu-law).
    InboundAudio { payload: String },
    /// The telephony peer ended the stream.
    Stop,
}

/// Side effects a transition asks the connection loop to perform.
#[derive(Debug)]
pub enum Command {
    /// Send a message to the conversation service.
    SendUpstream(ClientEvent),
    /// Forward synthesized agent audio to the telephony peer (base64).
    SendAudio { payload: String },
    /// Tell the telephony peer to discard buffered playback immediately.
    ClearPlayback,
    /// Tear the session down and flush the call record.
    Finalize,
}

/// Coarse session state, derived from the control flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    GreetingInFlight,
    AgentSpeaking,
    Listening,
    BargeInProgress,
    CancelInProgress,
    Terminated,
}

/// Per-call state machine.
pub struct CallSession {
    stream_sid: String,
    call_sid: String,
    caller: Option<String>,

    started_at: Instant,
    last_agent_audio: Option<Instant>,
    agent_speech_started: Option<Instant>,

    transcript: Transcript,
    leads: LeadSheet,

    started: bool,
    greeting_in_flight: bool,
    barge_enabled: bool,
    barge_in_progress: bool,
    cancel_in_progress: bool,
    /// A fired barge episode waiting for its transcript to classify.
    barge_resolution_pending: bool,
    agent_speaking: bool,
    response_in_flight: bool,
    terminated: bool,

    last_transcript: Option<(String, Instant)>,

    interrupter: Box<dyn Interrupter + Send>,
    classifier: TranscriptClassifier,
    greeting: String,
    barge_allowed: bool,
    agent_audio_hold: Duration,
    dedup_window: Duration,
}

impl CallSession {
    pub fn new(
        stream_sid: impl Into<String>,
        call_sid: impl Into<String>,
        caller: Option<String>,
        settings: &Settings,
    ) -> Self {
        Self {
            stream_sid: stream_sid.into(),
            call_sid: call_sid.into(),
            caller,
            started_at: Instant::now(),
            last_agent_audio: None,
            agent_speech_started: None,
            transcript: Transcript::new(),
            leads: LeadSheet::new(),
            started: false,
            greeting_in_flight: false,
            barge_enabled: false,
            barge_in_progress: false,
            cancel_in_progress: false,
            barge_resolution_pending: false,
            agent_speaking: false,
            response_in_flight: false,
            terminated: false,
            last_transcript: None,
            interrupter: interrupter_for(&settings.barge_in),
            classifier: TranscriptClassifier::new(&settings.classifier),
            greeting: settings.upstream.greeting.clone(),
            barge_allowed: settings.barge_in.enabled,
            agent_audio_hold: Duration::from_millis(settings.barge_in.agent_audio_hold_ms),
            dedup_window: Duration::from_millis(settings.classifier.dedup_window_ms),
        }
    }

    /// Kick off the scripted opening: a system-authored greeting
    /// instruction plus a response trigger. The agent is not
    /// interruptible until this response fully completes.
    pub fn start(&mut self) -> Vec<Command> {
        if self.started || self.terminated {
            return Vec::new();
        }
        self.started = true;
        self.greeting_in_flight = true;
        tracing::info!(
            call = %self.call_sid,
            stream = %self.stream_sid,
            "call session started, greeting in flight"
        );
        vec![
            Command::SendUpstream(ClientEvent::ConversationItemCreate {
                item: ConversationItem::system_text(format!(
                    "Greet the caller by saying: {}",
                    self.greeting
                )),
            }),
            Command::SendUpstream(ClientEvent::ResponseCreate),
        ]
    }

    /// Handle one event from the telephony peer.
    pub fn on_telephony(&mut self, event: TelephonyEvent) -> Vec<Command> {
        if self.terminated {
            return Vec::new();
        }
        match event {
            TelephonyEvent::InboundAudio { payload } => self.on_inbound_audio(payload),
            TelephonyEvent::Stop => self.finalize("telephony stop"),
        }
    }

    /// Handle one event from the conversation service.
    pub fn on_upstream(&mut self, event: ServerEvent) -> Vec<Command> {
        if self.terminated {
            return Vec::new();
        }
        match event {
            ServerEvent::SessionCreated
            | ServerEvent::SessionUpdated
            | ServerEvent::Unknown => Vec::new(),
            ServerEvent::ResponseCreated => {
                self.response_in_flight = true;
                Vec::new()
            }
            ServerEvent::ResponseAudioDelta { delta } => self.on_agent_audio(delta),
            ServerEvent::ResponseAudioDone => {
                self.agent_speaking = false;
                self.agent_speech_started = None;
                Vec::new()
            }
            ServerEvent::ResponseAudioTranscriptDone { transcript } => {
                self.transcript.push_agent(transcript);
                Vec::new()
            }
            ServerEvent::ResponseDone | ServerEvent::ResponseCancelled => self.on_response_done(),
            ServerEvent::SpeechStarted => self.on_provider_speech_started(),
            ServerEvent::SpeechStopped => {
                // Provider-side VAD saw end of speech; force transcription.
                vec![Command::SendUpstream(ClientEvent::InputAudioBufferCommit)]
            }
            ServerEvent::TranscriptionCompleted { transcript } => self.on_transcription(transcript),
            ServerEvent::Error { error } => {
                tracing::warn!(
                    call = %self.call_sid,
                    code = ?error.code,
                    message = %error.message,
                    "upstream error event"
                );
                Vec::new()
            }
        }
    }

    /// Terminate the session. Idempotent; the terminal state is not
    /// re-enterable.
    pub fn finalize(&mut self, reason: &str) -> Vec<Command> {
        if self.terminated {
            return Vec::new();
        }
        self.terminated = true;
        self.barge_resolution_pending = false;
        tracing::info!(
            call = %self.call_sid,
            reason,
            duration_secs = self.started_at.elapsed().as_secs(),
            "call session terminated"
        );
        vec![Command::Finalize]
    }

    fn on_inbound_audio(&mut self, payload: String) -> Vec<Command> {
        let frame = AudioFrame::from_base64(&payload);

        // Always forwarded, with no batching; the upstream handle queues
        // if the socket has not opened yet.
        let mut cmds = vec![Command::SendUpstream(ClientEvent::InputAudioBufferAppend {
            audio: payload,
        })];

        let ctx = self.barge_context(frame.received_at);
        if self.interrupter.on_inbound_frame(&frame, &ctx) {
            self.fire_barge(&mut cmds);
        }
        cmds
    }

    fn on_agent_audio(&mut self, delta: String) -> Vec<Command> {
        let now = Instant::now();
        self.last_agent_audio = Some(now);
        if !self.agent_speaking {
            self.agent_speaking = true;
            self.agent_speech_started = Some(now);
        }

        if self.cancel_in_progress {
            // The caller must not hear audio generated after the cancel
            // was requested.
            return Vec::new();
        }
        vec![Command::SendAudio { payload: delta }]
    }

    fn on_response_done(&mut self) -> Vec<Command> {
        self.agent_speaking = false;
        self.response_in_flight = false;
        self.agent_speech_started = None;

        if self.greeting_in_flight {
            self.greeting_in_flight = false;
            self.barge_enabled = self.barge_allowed;
            tracing::info!(
                call = %self.call_sid,
                barge_enabled = self.barge_enabled,
                "greeting complete"
            );
        }

        self.barge_in_progress = false;
        self.cancel_in_progress = false;
        self.interrupter.reset_episode();
        Vec::new()
    }

    fn on_provider_speech_started(&mut self) -> Vec<Command> {
        let ctx = self.barge_context(Instant::now());
        let mut cmds = Vec::new();
        if self.interrupter.on_provider_speech_started(&ctx) {
            self.fire_barge(&mut cmds);
        }
        cmds
    }

    fn on_transcription(&mut self, transcript: String) -> Vec<Command> {
        let text = transcript.trim().to_string();
        if text.is_empty() {
            return Vec::new();
        }

        // Duplicate completion events inside the window are suppressed
        // before the classifier or extractor run.
        let now = Instant::now();
        if let Some((last_text, last_at)) = &self.last_transcript {
            if *last_text == text && now.saturating_duration_since(*last_at) <= self.dedup_window {
                tracing::debug!(call = %self.call_sid, "duplicate transcription suppressed");
                return Vec::new();
            }
        }
        self.last_transcript = Some((text.clone(), now));

        self.transcript.push_caller(&text);
        LeadExtractor::extract(&text).apply_to(&mut self.leads);

        if self.barge_resolution_pending {
            self.barge_resolution_pending = false;
            self.barge_in_progress = false;
            self.cancel_in_progress = false;
            self.interrupter.reset_episode();

            let worth_turn = !self.classifier.is_filler_only(&text)
                && self.classifier.is_strong_question(&text);
            if !worth_turn {
                // False interruption; the agent resumes implicitly.
                tracing::debug!(
                    call = %self.call_sid,
                    utterance = %text,
                    "barge-in dismissed as filler"
                );
                return Vec::new();
            }
            tracing::info!(
                call = %self.call_sid,
                utterance = %text,
                "barge-in confirmed, injecting turn"
            );
            return self.inject_turn(&text);
        }

        self.inject_turn(&text)
    }

    fn inject_turn(&mut self, text: &str) -> Vec<Command> {
        vec![
            Command::SendUpstream(ClientEvent::ConversationItemCreate {
                item: ConversationItem::user_text(text),
            }),
            Command::SendUpstream(ClientEvent::ResponseCreate),
        ]
    }

    fn fire_barge(&mut self, cmds: &mut Vec<Command>) {
        // At most one cancel in flight; a second trigger is a no-op.
        if self.cancel_in_progress {
            return;
        }
        self.barge_in_progress = true;
        self.cancel_in_progress = true;
        self.barge_resolution_pending = true;
        tracing::info!(call = %self.call_sid, "barge-in fired, cancelling agent speech");
        cmds.push(Command::SendUpstream(ClientEvent::ResponseCancel));
        cmds.push(Command::ClearPlayback);
    }

    fn barge_context(&self, now: Instant) -> BargeContext {
        BargeContext {
            barge_enabled: self.barge_enabled,
            barge_in_progress: self.barge_in_progress,
            agent_speaking_now: self.agent_speaking_now(now),
            agent_speech_started: self.agent_speech_started,
        }
    }

    /// The agent counts as speaking while the flag is set, a response is
    /// in flight, or its last audio arrived within the hold window.
    fn agent_speaking_now(&self, now: Instant) -> bool {
        self.agent_speaking
            || self.response_in_flight
            || self
                .last_agent_audio
                .is_some_and(|at| now.saturating_duration_since(at) <= self.agent_audio_hold)
    }

    pub fn state(&self) -> CallState {
        if self.terminated {
            CallState::Terminated
        } else if self.cancel_in_progress {
            CallState::CancelInProgress
        } else if self.barge_in_progress {
            CallState::BargeInProgress
        } else if self.greeting_in_flight {
            CallState::GreetingInFlight
        } else if self.agent_speaking || self.response_in_flight {
            CallState::AgentSpeaking
        } else if self.started {
            CallState::Listening
        } else {
            CallState::Idle
        }
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }

    pub fn call_sid(&self) -> &str {
        &self.call_sid
    }

    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    pub fn leads(&self) -> &LeadSheet {
        &self.leads
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn barge_enabled(&self) -> bool {
        self.barge_enabled
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicebridge_core::LeadField;

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.barge_in.grace_ms = 0;
        settings
    }

    fn session() -> CallSession {
        CallSession::new("MZtest", "CAtest", Some("+15550001111".to_string()), &settings())
    }

    /// Run a session through its greeting so barge-in is armed.
    fn started_session() -> CallSession {
        let mut s = session();
        s.start();
        s.on_upstream(ServerEvent::ResponseDone);
        s
    }

    #[test]
    fn test_start_injects_greeting_and_trigger() {
        let mut s = session();
        let cmds = s.start();
        assert_eq!(cmds.len(), 2);
        assert!(matches!(
            cmds[0],
            Command::SendUpstream(ClientEvent::ConversationItemCreate { .. })
        ));
        assert!(matches!(
            cmds[1],
            Command::SendUpstream(ClientEvent::ResponseCreate)
        ));
        assert_eq!(s.state(), CallState::GreetingInFlight);
        assert!(!s.barge_enabled());
    }

    #[test]
    fn test_start_is_one_shot() {
        let mut s = session();
        assert_eq!(s.start().len(), 2);
        assert!(s.start().is_empty());
    }

    #[test]
    fn test_greeting_done_enables_barge_exactly_once() {
        let mut s = session();
        s.start();
        assert!(!s.barge_enabled());

        s.on_upstream(ServerEvent::ResponseDone);
        assert!(s.barge_enabled());
        assert_eq!(s.state(), CallState::Listening);

        // A second response-done re-fires no greeting side effect.
        s.on_upstream(ServerEvent::ResponseDone);
        assert!(s.barge_enabled());
        assert_eq!(s.state(), CallState::Listening);
    }

    #[test]
    fn test_barge_disabled_by_config_stays_off() {
        let mut cfg = settings();
        cfg.barge_in.enabled = false;
        let mut s = CallSession::new("MZ", "CA", None, &cfg);
        s.start();
        s.on_upstream(ServerEvent::ResponseDone);
        assert!(!s.barge_enabled());
    }

    #[test]
    fn test_inbound_audio_always_forwarded() {
        let mut s = started_session();
        let cmds = s.on_telephony(TelephonyEvent::InboundAudio {
            payload: "AAAA".to_string(),
        });
        assert_eq!(cmds.len(), 1);
        assert!(matches!(
            cmds[0],
            Command::SendUpstream(ClientEvent::InputAudioBufferAppend { .. })
        ));
    }

    #[test]
    fn test_agent_audio_forwarded_then_dropped_during_cancel() {
        let mut s = started_session();
        s.on_upstream(ServerEvent::ResponseCreated);

        let cmds = s.on_upstream(ServerEvent::ResponseAudioDelta {
            delta: "oDoc".to_string(),
        });
        assert!(matches!(cmds[0], Command::SendAudio { .. }));

        // Force a cancel episode, then deltas must be dropped.
        s.cancel_in_progress = true;
        s.barge_in_progress = true;
        let cmds = s.on_upstream(ServerEvent::ResponseAudioDelta {
            delta: "oDoc".to_string(),
        });
        assert!(cmds.is_empty());
    }

    #[test]
    fn test_speech_stopped_commits_input_buffer() {
        let mut s = started_session();
        let cmds = s.on_upstream(ServerEvent::SpeechStopped);
        assert_eq!(cmds.len(), 1);
        assert!(matches!(
            cmds[0],
            Command::SendUpstream(ClientEvent::InputAudioBufferCommit)
        ));
    }

    #[test]
    fn test_transcription_injects_turn_and_extracts_leads() {
        let mut s = started_session();
        let cmds = s.on_upstream(ServerEvent::TranscriptionCompleted {
            transcript: "My name is Sarah Connor".to_string(),
        });
        assert_eq!(cmds.len(), 2);
        assert_eq!(s.transcript().len(), 1);
        assert_eq!(s.leads().get(LeadField::Name), Some("Sarah Connor"));
    }

    #[test]
    fn test_duplicate_transcription_suppressed() {
        let mut s = started_session();
        let first = s.on_upstream(ServerEvent::TranscriptionCompleted {
            transcript: "what's your pricing".to_string(),
        });
        assert_eq!(first.len(), 2);

        let second = s.on_upstream(ServerEvent::TranscriptionCompleted {
            transcript: "what's your pricing".to_string(),
        });
        assert!(second.is_empty());
        assert_eq!(s.transcript().len(), 1);
    }

    #[test]
    fn test_distinct_transcriptions_both_processed() {
        let mut s = started_session();
        s.on_upstream(ServerEvent::TranscriptionCompleted {
            transcript: "what's your pricing".to_string(),
        });
        let cmds = s.on_upstream(ServerEvent::TranscriptionCompleted {
            transcript: "do you do websites".to_string(),
        });
        assert_eq!(cmds.len(), 2);
        assert_eq!(s.transcript().len(), 2);
    }

    #[test]
    fn test_agent_transcript_recorded() {
        let mut s = started_session();
        s.on_upstream(ServerEvent::ResponseAudioTranscriptDone {
            transcript: "Happy to help with pricing.".to_string(),
        });
        assert_eq!(s.transcript().len(), 1);
        assert!(s.transcript().render().starts_with("Agent:"));
    }

    #[test]
    fn test_stop_finalizes_once() {
        let mut s = started_session();
        let cmds = s.on_telephony(TelephonyEvent::Stop);
        assert!(matches!(cmds[0], Command::Finalize));
        assert!(s.is_terminated());

        // Terminal state is not re-enterable.
        assert!(s.on_telephony(TelephonyEvent::Stop).is_empty());
        assert!(s
            .on_upstream(ServerEvent::TranscriptionCompleted {
                transcript: "hello".to_string(),
            })
            .is_empty());
        assert!(s.start().is_empty());
    }

    #[test]
    fn test_malformed_audio_is_silence_not_error() {
        let mut s = started_session();
        let cmds = s.on_telephony(TelephonyEvent::InboundAudio {
            payload: "!!not-base64!!".to_string(),
        });
        // Still forwarded; never a failure.
        assert_eq!(cmds.len(), 1);
    }
}
