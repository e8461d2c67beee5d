//! Telephony media-stream WebSocket handler
//!
//! One socket carries one phone call. Inbound text frames are parsed into
//! transport events and handed to a fresh [`SessionController`]; outbound
//! frames are written by a dedicated sender task that drains the session's
//! outbound channel.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::session::{
    FatalSignal, OutboundFrame, SessionController, SessionError, TransportError, TransportEvent,
};
use crate::state::AppState;

/// Outbound frames queued per call before the session waits on the socket
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Upgrades the carrier's HTTP request to the media-stream WebSocket
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("Media stream upgrade requested");
    ws.on_upgrade(move |socket| handle_media_socket(socket, state))
}

async fn handle_media_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (frame_tx, mut frame_rx) = mpsc::channel::<OutboundFrame>(CHANNEL_BUFFER_SIZE);

    let mut controller = SessionController::new(
        app_state.session_config.clone(),
        app_state.providers.clone(),
        frame_tx,
    );
    let session_id = controller.session_id().to_string();
    let fatal = controller.fatal_signal();
    info!(session = %session_id, "Media stream connection established");

    let sender_fatal = fatal.clone();
    let sender_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let text = match frame.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "Failed to serialize outbound frame");
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text.into())).await {
                report_transport_loss(&sender_fatal, e.to_string());
                break;
            }
        }
    });

    controller.accept();

    loop {
        select! {
            biased;
            _ = fatal.raised() => {
                warn!(session = %session_id, "Ending call after fatal session error");
                break;
            }
            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(msg)) => {
                        let Some(event) = parse_message(msg, &session_id) else {
                            continue;
                        };
                        let is_stop = event == TransportEvent::Stop;
                        if let Err(e) = controller.handle_event(event).await {
                            if e.is_fatal() {
                                fatal.raise(e);
                                break;
                            }
                            warn!(session = %session_id, error = %e, "Session event failed");
                        }
                        if is_stop {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        report_transport_loss(&fatal, e.to_string());
                        break;
                    }
                    None => {
                        info!(session = %session_id, "Media stream closed by carrier");
                        break;
                    }
                }
            }
        }
    }

    controller.close().await;
    sender_task.abort();
    info!(session = %session_id, "Media stream connection terminated");
}

fn report_transport_loss(fatal: &FatalSignal, reason: String) {
    fatal.raise(SessionError::Transport(TransportError::Closed(reason)));
}

/// Turn one WebSocket message into a transport event.
///
/// Malformed frames are logged and skipped so one bad frame cannot end a call.
fn parse_message(msg: Message, session_id: &str) -> Option<TransportEvent> {
    match msg {
        Message::Text(text) => match serde_json::from_str::<TransportEvent>(&text) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(session = %session_id, error = %e, "Skipping malformed transport frame");
                None
            }
        },
        Message::Binary(data) => {
            debug!(session = %session_id, bytes = data.len(), "Ignoring binary frame");
            None
        }
        Message::Ping(_) | Message::Pong(_) => None,
        Message::Close(_) => {
            info!(session = %session_id, "Carrier sent close frame");
            Some(TransportEvent::Stop)
        }
    }
}
