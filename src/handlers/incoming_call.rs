use axum::{
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::info;

use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;

pub const MEDIA_STREAM_PATH: &str = "/media-stream";

/// Carrier webhook for a new inbound call
///
/// Answers with call-control markup telling the carrier to stream the call's
/// audio to this server's media-stream WebSocket.
pub async fn incoming_call_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let host = match &state.config.public_host {
        Some(host) => host.clone(),
        None => headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("missing Host header".to_string()))?,
    };
    info!(host = %host, "Incoming call; connecting media stream");

    Ok((
        [(header::CONTENT_TYPE, "application/xml")],
        connect_stream_markup(&host),
    )
        .into_response())
}

/// Markup that connects the call to `wss://<host>/media-stream`.
pub fn connect_stream_markup(host: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Response><Connect><Stream url=\"wss://{}{MEDIA_STREAM_PATH}\" /></Connect></Response>",
        escape_attribute(host)
    )
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
