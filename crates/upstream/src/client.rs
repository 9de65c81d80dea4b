//! Streaming client for the conversation service
//!
//! The handle is usable the moment [`UpstreamClient::connect`] returns:
//! sends before the socket reaches open land in an ordered pending
//! queue, flushed FIFO exactly once on open, after which sends go
//! straight to the writer.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use voicebridge_config::UpstreamConfig;

use crate::events::{ClientEvent, ServerEvent, SessionConfig};
use crate::UpstreamError;

/// Connection lifecycle: not-open -> open -> closed, one way only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    NotOpen,
    Open,
    Closed,
}

enum WriterCmd {
    Frame(String),
    Close,
}

/// Entry point for establishing upstream connections.
pub struct UpstreamClient;

impl UpstreamClient {
    /// Begin connecting to the conversation service.
    ///
    /// Returns immediately with a send handle and the inbound event
    /// stream. The event channel closing is the close signal: transport
    /// errors, a server-side close and a local [`UpstreamHandle::close`]
    /// all end the stream, and the owning session tears down in
    /// response. There is no reconnection.
    pub fn connect(config: UpstreamConfig) -> (UpstreamHandle, mpsc::Receiver<ServerEvent>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(256);

        let handle = UpstreamHandle {
            inner: Arc::new(HandleInner {
                state: Mutex::new(LinkState::NotOpen),
                pending: Mutex::new(VecDeque::new()),
                out_tx,
            }),
        };

        tokio::spawn(run_connection(config, handle.clone(), out_rx, event_tx));

        (handle, event_rx)
    }
}

/// Cloneable send handle for one upstream connection.
#[derive(Clone)]
pub struct UpstreamHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    state: Mutex<LinkState>,
    pending: Mutex<VecDeque<String>>,
    out_tx: mpsc::UnboundedSender<WriterCmd>,
}

impl UpstreamHandle {
    /// Serialize and transmit immediately if open; otherwise append to
    /// the ordered pending queue.
    pub fn send(&self, event: &ClientEvent) -> Result<(), UpstreamError> {
        let json = serde_json::to_string(event)?;

        let state = self.inner.state.lock();
        match *state {
            LinkState::NotOpen => {
                self.inner.pending.lock().push_back(json);
                Ok(())
            }
            LinkState::Open => self
                .inner
                .out_tx
                .send(WriterCmd::Frame(json))
                .map_err(|_| UpstreamError::Closed),
            LinkState::Closed => Err(UpstreamError::Closed),
        }
    }

    /// Close the connection. Idempotent; safe on an already-closed link.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if *state != LinkState::Closed {
            *state = LinkState::Closed;
            let _ = self.inner.out_tx.send(WriterCmd::Close);
        }
    }

    pub fn state(&self) -> LinkState {
        *self.inner.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state() == LinkState::Open
    }

    /// Flush the pending queue in FIFO order and mark the link open.
    /// Called exactly once by the connection task after the session
    /// configuration has gone out.
    fn mark_open(&self) {
        let mut state = self.inner.state.lock();
        if *state == LinkState::NotOpen {
            let mut pending = self.inner.pending.lock();
            for json in pending.drain(..) {
                let _ = self.inner.out_tx.send(WriterCmd::Frame(json));
            }
            *state = LinkState::Open;
        }
    }

    fn mark_closed(&self) {
        *self.inner.state.lock() = LinkState::Closed;
    }
}

fn build_request(config: &UpstreamConfig) -> Result<Request, UpstreamError> {
    let mut request = config.url.as_str().into_client_request()?;
    if !config.api_key.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| UpstreamError::InvalidHeader)?;
        request.headers_mut().insert("Authorization", value);
    }
    Ok(request)
}

async fn run_connection(
    config: UpstreamConfig,
    handle: UpstreamHandle,
    mut out_rx: mpsc::UnboundedReceiver<WriterCmd>,
    event_tx: mpsc::Sender<ServerEvent>,
) {
    let request = match build_request(&config) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "invalid upstream request");
            handle.mark_closed();
            return;
        }
    };

    let (ws, _) = match connect_async(request).await {
        Ok(ok) => ok,
        Err(e) => {
            tracing::error!(error = %e, "upstream connection failed");
            handle.mark_closed();
            return;
        }
    };
    tracing::info!(url = %config.url, "upstream connection established");

    let (mut sink, mut stream) = ws.split();

    // Session configuration goes out before anything queued.
    let session_update = ClientEvent::SessionUpdate {
        session: SessionConfig::from_settings(&config),
    };
    match serde_json::to_string(&session_update) {
        Ok(json) => {
            if let Err(e) = sink.send(Message::Text(json)).await {
                tracing::error!(error = %e, "failed to send session configuration");
                handle.mark_closed();
                return;
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize session configuration");
            handle.mark_closed();
            return;
        }
    }
    handle.mark_open();

    loop {
        tokio::select! {
            cmd = out_rx.recv() => match cmd {
                Some(WriterCmd::Frame(json)) => {
                    if let Err(e) = sink.send(Message::Text(json)).await {
                        tracing::warn!(error = %e, "upstream send failed");
                        break;
                    }
                }
                Some(WriterCmd::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(ServerEvent::Unknown) => {
                            tracing::debug!("unhandled upstream event type dropped");
                        }
                        Ok(event) => {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "malformed upstream event dropped");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("upstream connection closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(error = %e, "upstream read error");
                    break;
                }
            }
        }
    }

    handle.mark_closed();
    // Dropping event_tx here ends the event stream; the session treats
    // that as the stop signal and finalizes.
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached_handle() -> (UpstreamHandle, mpsc::UnboundedReceiver<WriterCmd>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let handle = UpstreamHandle {
            inner: Arc::new(HandleInner {
                state: Mutex::new(LinkState::NotOpen),
                pending: Mutex::new(VecDeque::new()),
                out_tx,
            }),
        };
        (handle, out_rx)
    }

    fn frame_json(cmd: WriterCmd) -> String {
        match cmd {
            WriterCmd::Frame(json) => json,
            WriterCmd::Close => panic!("unexpected close"),
        }
    }

    #[tokio::test]
    async fn test_sends_queue_until_open_then_flush_fifo() {
        let (handle, mut out_rx) = detached_handle();

        handle.send(&ClientEvent::ResponseCreate).unwrap();
        handle
            .send(&ClientEvent::InputAudioBufferAppend {
                audio: "AAAA".to_string(),
            })
            .unwrap();

        // Nothing reaches the writer before open.
        assert!(out_rx.try_recv().is_err());

        handle.mark_open();
        assert!(handle.is_open());

        let first = frame_json(out_rx.try_recv().unwrap());
        let second = frame_json(out_rx.try_recv().unwrap());
        assert!(first.contains("response.create"));
        assert!(second.contains("input_audio_buffer.append"));

        // Direct send once open.
        handle.send(&ClientEvent::InputAudioBufferCommit).unwrap();
        let third = frame_json(out_rx.try_recv().unwrap());
        assert!(third.contains("input_audio_buffer.commit"));
    }

    #[tokio::test]
    async fn test_mark_open_is_one_shot() {
        let (handle, mut out_rx) = detached_handle();
        handle.send(&ClientEvent::ResponseCreate).unwrap();
        handle.mark_open();
        handle.mark_open();
        assert!(out_rx.try_recv().is_ok());
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_rejects_sends() {
        let (handle, mut out_rx) = detached_handle();
        handle.mark_open();
        handle.close();
        handle.close();

        assert_eq!(handle.state(), LinkState::Closed);
        assert!(matches!(
            handle.send(&ClientEvent::ResponseCreate),
            Err(UpstreamError::Closed)
        ));

        // Exactly one close command despite two close() calls.
        assert!(matches!(out_rx.try_recv(), Ok(WriterCmd::Close)));
        assert!(out_rx.try_recv().is_err());
    }
}
