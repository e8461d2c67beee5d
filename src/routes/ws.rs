use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::incoming_call::MEDIA_STREAM_PATH;
use crate::handlers::media_stream;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media-stream WebSocket router
///
/// The carrier opens this socket after `/incoming-call` tells it where to
/// stream. It is unauthenticated; restrict it at the network edge if needed.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(MEDIA_STREAM_PATH, get(media_stream::media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
