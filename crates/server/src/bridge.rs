//! Per-call bridge loop
//!
//! Wires one telephony WebSocket to one upstream connection through a
//! `CallSession`. Events from both peers are consumed one at a time and
//! every state mutation happens inside this single task, so session
//! flags are never raced. Commands the session returns are executed
//! here, keeping the state machine free of I/O.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use voicebridge_persistence::CallRecord;
use voicebridge_pipeline::{CallSession, Command, TelephonyEvent};
use voicebridge_upstream::{UpstreamClient, UpstreamHandle};

use crate::state::AppState;
use crate::telephony::{GatewayInbound, GatewayOutbound, StartMeta};

/// Drive one telephony stream from upgrade to teardown.
pub async fn handle_stream(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Some(start) = await_start(&mut receiver).await else {
        tracing::debug!("telephony stream ended before start frame");
        return;
    };

    let active = state.call_started();
    tracing::info!(
        call = %start.call_sid,
        stream = %start.stream_sid,
        caller = start.caller().as_deref().unwrap_or("unknown"),
        active,
        "stream started"
    );

    // One upstream connection per call; a failure there terminates the
    // call rather than retrying.
    let (upstream, mut upstream_events) =
        UpstreamClient::connect(state.settings.upstream.clone());

    let mut session = CallSession::new(
        &start.stream_sid,
        &start.call_sid,
        start.caller(),
        &state.settings,
    );
    let stream_sid = start.stream_sid.clone();

    let mut done = run_commands(session.start(), &upstream, &mut sender, &stream_sid).await;

    while !done {
        let cmds = tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<GatewayInbound>(&text) {
                    Ok(GatewayInbound::Media { media }) if media.is_inbound() => {
                        session.on_telephony(TelephonyEvent::InboundAudio {
                            payload: media.payload,
                        })
                    }
                    Ok(GatewayInbound::Stop) => session.on_telephony(TelephonyEvent::Stop),
                    Ok(_) => Vec::new(),
                    Err(e) => {
                        tracing::warn!(error = %e, "malformed telephony frame dropped");
                        Vec::new()
                    }
                },
                Some(Ok(Message::Close(_))) | None => session.finalize("telephony closed"),
                Some(Ok(_)) => Vec::new(),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "telephony read error");
                    session.finalize("telephony error")
                }
            },
            event = upstream_events.recv() => match event {
                Some(event) => session.on_upstream(event),
                // The event stream ending is the upstream close signal.
                None => session.finalize("upstream closed"),
            },
        };
        done = run_commands(cmds, &upstream, &mut sender, &stream_sid).await;
    }

    upstream.close();
    flush_record(&session, &state);
    state.call_ended();
    tracing::info!(call = %session.call_sid(), "stream closed");
}

/// Read frames until the gateway announces the stream. A `connected`
/// handshake frame may precede `start`; media before `start` is dropped.
async fn await_start(receiver: &mut SplitStream<WebSocket>) -> Option<StartMeta> {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<GatewayInbound>(&text) {
                Ok(GatewayInbound::Start { start }) => return Some(start),
                Ok(GatewayInbound::Stop) => return None,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed telephony frame before start");
                    continue;
                }
            },
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "telephony read error before start");
                return None;
            }
        }
    }
    None
}

/// Execute the side effects a transition produced. Returns true when the
/// session asked to finalize.
async fn run_commands(
    cmds: Vec<Command>,
    upstream: &UpstreamHandle,
    sender: &mut SplitSink<WebSocket, Message>,
    stream_sid: &str,
) -> bool {
    let mut done = false;
    for cmd in cmds {
        match cmd {
            Command::SendUpstream(event) => {
                if let Err(e) = upstream.send(&event) {
                    tracing::debug!(error = %e, "upstream send dropped");
                }
            }
            Command::SendAudio { payload } => {
                send_gateway(sender, &GatewayOutbound::media(stream_sid, payload)).await;
            }
            Command::ClearPlayback => {
                send_gateway(sender, &GatewayOutbound::clear(stream_sid)).await;
            }
            Command::Finalize => done = true,
        }
    }
    done
}

async fn send_gateway(sender: &mut SplitSink<WebSocket, Message>, frame: &GatewayOutbound) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            if let Err(e) = sender.send(Message::Text(json)).await {
                tracing::debug!(error = %e, "telephony send failed");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize gateway frame"),
    }
}

/// Best-effort flush of the call record; never blocks teardown.
fn flush_record(session: &CallSession, state: &AppState) {
    let Some(record) = CallRecord::build(
        session.call_sid(),
        session.caller(),
        session.leads(),
        session.transcript(),
        session.duration(),
    ) else {
        tracing::debug!(call = %session.call_sid(), "nothing collected, no record written");
        return;
    };

    let store = state.lead_store.clone();
    tokio::spawn(async move {
        if let Err(e) = store.save(&record).await {
            tracing::warn!(call = %record.call_sid, error = %e, "lead record write failed");
        }
    });
}
