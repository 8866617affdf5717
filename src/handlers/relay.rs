//! Relay WebSocket handler
//!
//! Bridges one telephony media-stream connection to a [`CallSession`].
//!
//! Each connection runs three pieces:
//! - a sender task owning the socket sink, fed through a [`RelayRoute`] channel
//! - a reader task owning the socket stream, forwarding text frames and the
//!   final close cause, and cancelling the session's termination token when
//!   the transport goes away
//! - the connection task itself, which drives the session one frame at a time

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, header},
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::protocol::RelayRoute;
use crate::core::session::{CallSession, PeerKind, SessionIdentity, TerminationCause};
use crate::state::AppState;

/// Buffer size of the per-connection channels
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// How long the sender task may take to flush after the session ends
const SENDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What the reader task hands to the connection task
#[derive(Debug)]
enum TransportEvent {
    Frame(String),
    Closed(TerminationCause),
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Relay WebSocket handler
///
/// Upgrades the HTTP connection to the relay protocol. The optional
/// `callSid` query parameter seeds the session identity.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let user_agent = header_str(&headers, header::USER_AGENT);
    let origin = header_str(&headers, header::ORIGIN);
    let host = header_str(&headers, header::HOST);
    let peer = PeerKind::classify(user_agent.as_deref());

    info!(
        user_agent = ?user_agent,
        origin = ?origin,
        host = ?host,
        peer = peer.as_str(),
        "Relay WebSocket upgrade requested"
    );
    if peer == PeerKind::Unknown {
        warn!(user_agent = ?user_agent, "Connection does not identify as a telephony peer");
    }

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state, query, peer))
}

/// Drive one relay connection to completion
async fn handle_relay_socket(
    socket: WebSocket,
    app_state: Arc<AppState>,
    query: HashMap<String, String>,
    peer: PeerKind,
) {
    let guard = app_state.registry.acquire(Uuid::new_v4().to_string());
    let connection_id = guard.connection_id().to_string();

    let (mut sender, mut receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::channel::<RelayRoute>(CHANNEL_BUFFER_SIZE);

    let mut session = CallSession::new(
        connection_id.clone(),
        SessionIdentity::from_connection(&query),
        peer,
        route_tx,
        app_state.session_services(),
    );
    info!(
        connection_id = %connection_id,
        session_id = %session.session_id(),
        active = app_state.registry.active_count(),
        "Relay WebSocket connection established"
    );

    // Sender task for outgoing messages
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let should_close = matches!(route, RelayRoute::Close);

            let result = match route {
                RelayRoute::Outgoing(event) => match serde_json::to_string(&event) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing event: {}", e);
                        continue;
                    }
                },
                RelayRoute::Ping => {
                    debug!("Sending keep-alive ping");
                    sender.send(Message::Ping(Bytes::new())).await
                }
                RelayRoute::Close => {
                    info!("Closing relay WebSocket connection");
                    sender.send(Message::Close(None)).await
                }
            };

            if let Err(e) = result {
                warn!("Failed to send WebSocket message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    // Reader task for incoming frames
    let (event_tx, mut event_rx) = mpsc::channel::<TransportEvent>(CHANNEL_BUFFER_SIZE);
    let termination = session.termination_token();
    let reader_task = tokio::spawn(async move {
        let cause = loop {
            tokio::select! {
                _ = termination.cancelled() => return,
                message = receiver.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if event_tx.send(TransportEvent::Frame(text.as_str().to_owned())).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(bytes = data.len(), "Ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(_))) => debug!("Received ping"),
                    Some(Ok(Message::Pong(_))) => debug!("Received pong"),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(frame = ?frame, "Received close frame");
                        break TerminationCause::TransportClosed;
                    }
                    Some(Err(e)) => break TerminationCause::TransportError(e.to_string()),
                    None => break TerminationCause::TransportClosed,
                },
            }
        };

        // Abandon any generation in flight before the close is processed
        termination.cancel();
        let _ = event_tx.send(TransportEvent::Closed(cause)).await;
    });

    session.start_keepalive();
    guard.publish(session.snapshot());

    while let Some(event) = event_rx.recv().await {
        match event {
            TransportEvent::Frame(text) => {
                let keep_reading = session.handle_frame(&text).await;
                guard.publish(session.snapshot());
                if !keep_reading {
                    break;
                }
            }
            TransportEvent::Closed(cause) => {
                match &cause {
                    TerminationCause::TransportError(e) => {
                        warn!(session_id = %session.session_id(), error = %e, "Relay WebSocket error");
                    }
                    _ => info!(session_id = %session.session_id(), "Relay WebSocket closed by peer"),
                }
                session.terminate(cause);
                break;
            }
        }
    }

    // Covers the reader going away without reporting a cause
    session.terminate(TerminationCause::TransportClosed);

    // Cleanup
    reader_task.abort();
    drop(session);
    if timeout(SENDER_DRAIN_TIMEOUT, &mut sender_task).await.is_err() {
        warn!(connection_id = %connection_id, "Sender task did not finish, aborting");
        sender_task.abort();
    }
    drop(guard);

    info!(
        connection_id = %connection_id,
        active = app_state.registry.active_count(),
        "Relay WebSocket connection cleaned up"
    );
}
