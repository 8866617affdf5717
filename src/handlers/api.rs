//! Operational HTTP endpoints
//!
//! - `GET /health` - liveness with credential availability
//! - `GET /status` - counters and uptime
//! - `GET /debug` - one entry per open connection
//!
//! These handlers only read process state; they never touch a session.

use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::session::{PeerKind, SessionPhase, SessionSnapshot};
use crate::state::AppState;

/// Which upstream credentials are configured
#[derive(Debug, Serialize)]
pub struct ApiAvailability {
    pub openai: bool,
    pub elevenlabs: bool,
}

/// Response for GET /health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    /// Open relay connections
    pub connections: usize,
    pub port: u16,
    pub apis: ApiAvailability,
}

/// Response for GET /status
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub connections: usize,
    pub openai: bool,
    pub elevenlabs: bool,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: &'static str,
}

/// One open connection in GET /debug
#[derive(Debug, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: String,
    pub session_id: String,
    pub phase: SessionPhase,
    pub has_greeted: bool,
    pub turns: usize,
    pub media_packets: u64,
    pub peer: PeerKind,
    pub connected_seconds: u64,
}

impl From<SessionSnapshot> for ConnectionInfo {
    fn from(snapshot: SessionSnapshot) -> Self {
        let connected_seconds = snapshot.connected_seconds();
        Self {
            connection_id: snapshot.connection_id,
            session_id: snapshot.session_id,
            phase: snapshot.phase,
            has_greeted: snapshot.has_greeted,
            turns: snapshot.turns,
            media_packets: snapshot.media_packets,
            peer: snapshot.peer,
            connected_seconds,
        }
    }
}

/// Response for GET /debug
#[derive(Debug, Serialize)]
pub struct DebugResponse {
    pub connections: Vec<ConnectionInfo>,
    pub total_connections: usize,
    pub timestamp: String,
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: timestamp(),
        connections: state.registry.active_count(),
        port: state.config.port,
        apis: ApiAvailability {
            openai: state.config.has_openai_key(),
            elevenlabs: state.config.has_voice_credential(),
        },
    })
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        connections: state.registry.active_count(),
        openai: state.config.has_openai_key(),
        elevenlabs: state.config.has_voice_credential(),
        timestamp: timestamp(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// List open connections with their session snapshots
pub async fn debug_connections(State(state): State<Arc<AppState>>) -> Json<DebugResponse> {
    let connections: Vec<ConnectionInfo> = state
        .registry
        .snapshots()
        .into_iter()
        .map(ConnectionInfo::from)
        .collect();

    Json(DebugResponse {
        total_connections: state.registry.active_count(),
        connections,
        timestamp: timestamp(),
    })
}
