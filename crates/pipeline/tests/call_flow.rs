//! End-to-end call flow tests for the turn state machine
//!
//! These drive a session through realistic event sequences from both
//! peers and assert on the exact command stream it emits.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use voicebridge_config::Settings;
use voicebridge_core::encode_mulaw_sample;
use voicebridge_pipeline::{CallSession, CallState, Command, TelephonyEvent};
use voicebridge_upstream::{ClientEvent, ServerEvent};

fn settings() -> Settings {
    let mut settings = Settings::default();
    // The grace window is exercised by unit tests; here frames arrive
    // "immediately" after the agent starts, so disable it.
    settings.barge_in.grace_ms = 0;
    settings
}

fn loud_payload() -> String {
    BASE64.encode(vec![encode_mulaw_sample(8000); 160])
}

fn quiet_payload() -> String {
    BASE64.encode(vec![encode_mulaw_sample(30); 160])
}

fn feed_audio(session: &mut CallSession, payload: String) -> Vec<Command> {
    session.on_telephony(TelephonyEvent::InboundAudio { payload })
}

fn count_cancels(cmds: &[Command]) -> usize {
    cmds.iter()
        .filter(|c| matches!(c, Command::SendUpstream(ClientEvent::ResponseCancel)))
        .count()
}

fn count_clears(cmds: &[Command]) -> usize {
    cmds.iter()
        .filter(|c| matches!(c, Command::ClearPlayback))
        .count()
}

/// Stream start -> greeting -> caller interrupts with loud audio while
/// the agent speaks -> exactly one cancel and one buffer-clear -> the
/// interrupting question is accepted as a new turn.
#[test]
fn test_barge_in_cancels_agent_speech_once() {
    let mut session = CallSession::new("MZ1", "CA1", None, &settings());

    session.start();
    session.on_upstream(ServerEvent::ResponseDone);
    assert!(session.barge_enabled());

    // Agent begins its next answer.
    session.on_upstream(ServerEvent::ResponseCreated);
    session.on_upstream(ServerEvent::ResponseAudioDelta {
        delta: quiet_payload(),
    });
    assert_eq!(session.state(), CallState::AgentSpeaking);

    // Caller talks over the agent; two consecutive qualifying frames.
    let mut all_cmds = Vec::new();
    for _ in 0..4 {
        all_cmds.extend(feed_audio(&mut session, loud_payload()));
    }

    assert_eq!(count_cancels(&all_cmds), 1, "exactly one cancel");
    assert_eq!(count_clears(&all_cmds), 1, "exactly one buffer clear");
    assert_eq!(session.state(), CallState::CancelInProgress);

    // Audio generated after the cancel never reaches the caller.
    let dropped = session.on_upstream(ServerEvent::ResponseAudioDelta {
        delta: quiet_payload(),
    });
    assert!(dropped.is_empty());

    // The interrupting utterance resolves the episode as a strong
    // question and is injected as a new turn even though it arrived
    // during the barge.
    let cmds = session.on_upstream(ServerEvent::TranscriptionCompleted {
        transcript: "what's the price".to_string(),
    });
    assert_eq!(cmds.len(), 2);
    assert!(matches!(
        cmds[0],
        Command::SendUpstream(ClientEvent::ConversationItemCreate { .. })
    ));
    assert!(matches!(
        cmds[1],
        Command::SendUpstream(ClientEvent::ResponseCreate)
    ));
}

/// Caller audio stays below the threshold for the whole call: no cancel
/// is ever emitted.
#[test]
fn test_quiet_caller_never_cancels() {
    let mut session = CallSession::new("MZ2", "CA2", None, &settings());

    session.start();
    session.on_upstream(ServerEvent::ResponseDone);
    session.on_upstream(ServerEvent::ResponseCreated);
    session.on_upstream(ServerEvent::ResponseAudioDelta {
        delta: quiet_payload(),
    });

    let mut all_cmds = Vec::new();
    for _ in 0..100 {
        all_cmds.extend(feed_audio(&mut session, quiet_payload()));
    }

    assert_eq!(count_cancels(&all_cmds), 0);
    assert_eq!(count_clears(&all_cmds), 0);
    // Every frame still forwarded upstream.
    assert_eq!(all_cmds.len(), 100);
}

/// A filler utterance arriving during a barge episode is treated as a
/// false interruption: no new turn is injected and the agent resumes
/// implicitly.
#[test]
fn test_filler_barge_resolution_injects_nothing() {
    let mut session = CallSession::new("MZ3", "CA3", None, &settings());

    session.start();
    session.on_upstream(ServerEvent::ResponseDone);
    session.on_upstream(ServerEvent::ResponseCreated);
    session.on_upstream(ServerEvent::ResponseAudioDelta {
        delta: quiet_payload(),
    });

    let mut all_cmds = Vec::new();
    for _ in 0..3 {
        all_cmds.extend(feed_audio(&mut session, loud_payload()));
    }
    assert_eq!(count_cancels(&all_cmds), 1);

    // The cancelled response completes.
    session.on_upstream(ServerEvent::ResponseCancelled);

    let cmds = session.on_upstream(ServerEvent::TranscriptionCompleted {
        transcript: "uh yeah okay".to_string(),
    });
    assert!(cmds.is_empty(), "filler must not become a new turn");
    // The utterance is still part of the record.
    assert_eq!(session.transcript().len(), 1);
}

/// The greeting is not interruptible: loud caller audio during the
/// scripted opening emits no cancel.
#[test]
fn test_greeting_is_not_interruptible() {
    let mut session = CallSession::new("MZ4", "CA4", None, &settings());

    session.start();
    session.on_upstream(ServerEvent::ResponseCreated);
    session.on_upstream(ServerEvent::ResponseAudioDelta {
        delta: quiet_payload(),
    });
    assert_eq!(session.state(), CallState::GreetingInFlight);

    let mut all_cmds = Vec::new();
    for _ in 0..10 {
        all_cmds.extend(feed_audio(&mut session, loud_payload()));
    }
    assert_eq!(count_cancels(&all_cmds), 0);
}

/// After an episode resolves, a later interruption can fire again - one
/// cancel per episode, not one per call.
#[test]
fn test_second_episode_can_fire_after_resolution() {
    let mut session = CallSession::new("MZ5", "CA5", None, &settings());

    session.start();
    session.on_upstream(ServerEvent::ResponseDone);

    // First episode.
    session.on_upstream(ServerEvent::ResponseCreated);
    session.on_upstream(ServerEvent::ResponseAudioDelta {
        delta: quiet_payload(),
    });
    let mut cmds = Vec::new();
    for _ in 0..3 {
        cmds.extend(feed_audio(&mut session, loud_payload()));
    }
    assert_eq!(count_cancels(&cmds), 1);

    session.on_upstream(ServerEvent::ResponseCancelled);
    session.on_upstream(ServerEvent::TranscriptionCompleted {
        transcript: "how much does this cost".to_string(),
    });

    // Second episode during the next answer.
    session.on_upstream(ServerEvent::ResponseCreated);
    session.on_upstream(ServerEvent::ResponseAudioDelta {
        delta: quiet_payload(),
    });
    let mut cmds = Vec::new();
    for _ in 0..3 {
        cmds.extend(feed_audio(&mut session, loud_payload()));
    }
    assert_eq!(count_cancels(&cmds), 1);
}
