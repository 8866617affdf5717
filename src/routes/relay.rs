//! Relay WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router
///
/// # Endpoints
///
/// `GET /` and `GET /ws` - WebSocket upgrade for a telephony media stream.
/// An optional `callSid` query parameter seeds the session id.
///
/// # Protocol
///
/// The peer sends JSON text frames with an `event` discriminator
/// (`connected`, `start`, `media`, `transcript`, `mark`, `stop`).
///
/// The relay responds with:
/// - `connected` acknowledging the handshake
/// - `speak` with the greeting after `start` and with every generated reply
///
/// # Example
///
/// ```json
/// // Peer sends
/// {"event": "transcript", "transcript": {"speech": "quero agendar uma consulta"}}
///
/// // Relay responds
/// {"event": "speak", "text": "Claro! Para qual dia?"}
/// ```
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(relay_handler))
        .route("/ws", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
