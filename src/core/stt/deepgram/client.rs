//! Deepgram streaming client.
//!
//! One I/O task owns the socket: it forwards audio and control frames from an
//! unbounded channel and normalizes everything Deepgram sends back. A second
//! task pushes `KeepAlive` on a fixed interval until the session closes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::messages::{ControlMessage, ServerMessage};
use crate::core::stt::base::{
    Recognizer, RecognizerConfig, RecognizerConnectionState, RecognizerError, RecognizerEvent,
    RecognizerEventStream, RecognizerStats,
};

/// Deepgram implementation of [`Recognizer`].
pub struct DeepgramRecognizer {
    config: RecognizerConfig,
    state: Arc<RwLock<RecognizerConnectionState>>,
    stats: Arc<Mutex<RecognizerStats>>,
    /// Outgoing frames for the I/O task
    ws_tx: Option<mpsc::UnboundedSender<Message>>,
    /// Handed to the I/O task on connect
    event_tx: Option<mpsc::UnboundedSender<RecognizerEvent>>,
    event_rx: Option<RecognizerEventStream>,
    /// Set once close has been requested locally
    closing: Arc<AtomicBool>,
    shutdown: CancellationToken,
    keepalive_cancel: CancellationToken,
    connection_handle: Option<JoinHandle<()>>,
    keepalive_handle: Option<JoinHandle<()>>,
}

impl DeepgramRecognizer {
    pub fn new(config: RecognizerConfig) -> Result<Self, RecognizerError> {
        config.validate()?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(RecognizerConnectionState::Disconnected)),
            stats: Arc::new(Mutex::new(RecognizerStats::default())),
            ws_tx: None,
            event_tx: Some(event_tx),
            event_rx: Some(event_rx),
            closing: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            keepalive_cancel: CancellationToken::new(),
            connection_handle: None,
            keepalive_handle: None,
        })
    }

    pub fn connection_state(&self) -> RecognizerConnectionState {
        self.state.read().clone()
    }

    fn set_state(&self, state: RecognizerConnectionState) {
        *self.state.write() = state;
    }

    /// Decode one inbound frame. Returns `true` when the server closed the stream.
    fn handle_websocket_message(
        message: Message,
        event_tx: &mpsc::UnboundedSender<RecognizerEvent>,
        stats: &Mutex<RecognizerStats>,
    ) -> bool {
        match message {
            Message::Text(text) => match ServerMessage::parse(text.as_str()) {
                Ok(parsed) => {
                    for event in parsed.into_events() {
                        stats.lock().record_event(&event);
                        if event_tx.send(event).is_err() {
                            debug!("Recognizer event receiver dropped");
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to parse Deepgram message: {}", e);
                }
            },
            Message::Close(frame) => {
                info!("Deepgram closed the connection: {:?}", frame);
                return true;
            }
            Message::Binary(_) => {
                debug!("Ignoring unexpected binary frame from Deepgram");
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
        false
    }

    fn spawn_keepalive(&mut self, ws_tx: mpsc::UnboundedSender<Message>) {
        let interval = self.config.keepalive_interval;
        let cancel = self.keepalive_cancel.clone();
        let stats = self.stats.clone();

        self.keepalive_handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let keepalive = Message::Text(ControlMessage::KeepAlive.to_json().into());
                        if ws_tx.send(keepalive).is_err() {
                            debug!("Keepalive stopped: connection task has exited");
                            break;
                        }
                        stats.lock().keepalives_sent += 1;
                        debug!("Sent Deepgram keepalive");
                    }
                }
            }
        }));
    }
}

#[async_trait::async_trait]
impl Recognizer for DeepgramRecognizer {
    async fn connect(&mut self) -> Result<(), RecognizerError> {
        match self.connection_state() {
            RecognizerConnectionState::Connected => return Ok(()),
            RecognizerConnectionState::Closed => {
                return Err(RecognizerError::ConnectionFailed(
                    "recognizer has already been closed".to_string(),
                ));
            }
            _ => {}
        }
        let Some(event_tx) = self.event_tx.take() else {
            return Err(RecognizerError::ConnectionFailed(
                "recognizer connection was already started".to_string(),
            ));
        };

        self.set_state(RecognizerConnectionState::Connecting);

        let url = self.config.build_websocket_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RecognizerError::ConnectionFailed(format!("Invalid request: {e}")))?;
        let auth = HeaderValue::from_str(&format!("token {}", self.config.api_key))
            .map_err(|e| RecognizerError::ConfigurationError(format!("Invalid API key: {e}")))?;
        request.headers_mut().insert("Authorization", auth);

        info!(flavor = ?self.config.flavor, model = %self.config.model, "Connecting to Deepgram");

        let ws_stream = match timeout(self.config.connect_timeout, connect_async(request)).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                let message = e.to_string();
                self.set_state(RecognizerConnectionState::Error(message.clone()));
                return Err(if message.contains("401") || message.contains("403") {
                    RecognizerError::AuthenticationFailed(message)
                } else {
                    RecognizerError::ConnectionFailed(message)
                });
            }
            Err(_) => {
                self.set_state(RecognizerConnectionState::Error("timeout".to_string()));
                return Err(RecognizerError::ConnectionFailed(
                    "Connection timeout".to_string(),
                ));
            }
        };

        let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<Message>();
        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let shutdown = self.shutdown.clone();
        let closing = self.closing.clone();
        let state = self.state.clone();
        let stats = self.stats.clone();

        let connection_handle = tokio::spawn(async move {
            let mut outgoing_open = true;
            let mut lost: Option<RecognizerError> = None;

            loop {
                tokio::select! {
                    outgoing = ws_rx.recv(), if outgoing_open => {
                        match outgoing {
                            Some(message) => {
                                if let Err(e) = ws_sink.send(message).await {
                                    let err = RecognizerError::ConnectionLost(format!(
                                        "Failed to send WebSocket message: {e}"
                                    ));
                                    error!("{}", err);
                                    lost = Some(err);
                                    break;
                                }
                            }
                            // Every sender is gone: keep reading until Deepgram finalizes
                            None => outgoing_open = false,
                        }
                    }

                    incoming = ws_stream.next() => {
                        match incoming {
                            Some(Ok(message)) => {
                                if Self::handle_websocket_message(message, &event_tx, &stats) {
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                lost = Some(RecognizerError::ConnectionLost(format!(
                                    "WebSocket error: {e}"
                                )));
                                break;
                            }
                            None => {
                                debug!("Deepgram stream ended");
                                break;
                            }
                        }
                    }

                    _ = shutdown.cancelled() => {
                        debug!("Deepgram connection task cancelled");
                        break;
                    }
                }
            }

            let requested = closing.load(Ordering::SeqCst);
            if !requested {
                let err = lost.unwrap_or_else(|| {
                    RecognizerError::ConnectionLost("stream ended unexpectedly".to_string())
                });
                error!("Deepgram connection lost: {}", err);
                *state.write() = RecognizerConnectionState::Error(err.to_string());
                let _ = event_tx.send(RecognizerEvent::ConnectionError(err));
            } else if let Some(err) = lost {
                warn!("Deepgram connection ended with error during close: {}", err);
            }

            let _ = ws_sink.close().await;
            let _ = event_tx.send(RecognizerEvent::ConnectionClosed);
            info!("Deepgram connection closed");
        });

        self.connection_handle = Some(connection_handle);
        self.spawn_keepalive(ws_tx.clone());
        self.ws_tx = Some(ws_tx);
        self.set_state(RecognizerConnectionState::Connected);

        info!("Successfully connected to Deepgram");
        Ok(())
    }

    async fn send_audio(&mut self, audio: Bytes) -> Result<(), RecognizerError> {
        if audio.is_empty() || !self.is_ready() {
            return Ok(());
        }
        let Some(ws_tx) = self.ws_tx.as_ref() else {
            return Ok(());
        };

        let len = audio.len();
        ws_tx
            .send(Message::Binary(audio))
            .map_err(|_| RecognizerError::SendFailed("connection task has exited".to_string()))?;

        let mut stats = self.stats.lock();
        stats.audio_bytes_sent += len as u64;
        stats.audio_chunks_sent += 1;
        Ok(())
    }

    fn events(&mut self) -> Option<RecognizerEventStream> {
        self.event_rx.take()
    }

    async fn close(&mut self) -> Result<(), RecognizerError> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Never connected: drop the unused sender so the event stream terminates
        if self.event_tx.take().is_some() {
            self.set_state(RecognizerConnectionState::Closed);
            return Ok(());
        }

        self.keepalive_cancel.cancel();
        if let Some(handle) = self.keepalive_handle.take() {
            let _ = handle.await;
        }

        if let Some(ws_tx) = self.ws_tx.take() {
            let close_stream = Message::Text(ControlMessage::CloseStream.to_json().into());
            if ws_tx.send(close_stream).is_err() {
                debug!("Deepgram connection already gone before CloseStream");
            }
        }

        if let Some(mut handle) = self.connection_handle.take() {
            match timeout(self.config.connect_timeout, &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("Deepgram did not finish closing in time; cancelling");
                    self.shutdown.cancel();
                    if timeout(Duration::from_secs(1), &mut handle).await.is_err() {
                        handle.abort();
                    }
                }
            }
        }

        self.set_state(RecognizerConnectionState::Closed);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        matches!(self.connection_state(), RecognizerConnectionState::Connected)
            && !self.closing.load(Ordering::SeqCst)
    }

    fn stats(&self) -> RecognizerStats {
        self.stats.lock().clone()
    }

    fn provider_info(&self) -> &'static str {
        "Deepgram Streaming STT"
    }
}

impl Drop for DeepgramRecognizer {
    fn drop(&mut self) {
        self.keepalive_cancel.cancel();
        self.shutdown.cancel();
    }
}
