//! Call session state machine
//!
//! One [`CallSession`] exists per accepted connection and is driven by that
//! connection's task only. Frames are handled strictly in arrival order and
//! reply generation is awaited inline, so turns never interleave.
//!
//! ```text
//! Pending --start--> Active --stop / transport close--> Ended
//!    \__________________stop / transport close_________/^
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::history::{ConversationHistory, Turn};
use super::identity::{IdentityInputs, SessionIdentity};
use super::keepalive::KeepAlive;
use super::peer::PeerKind;
use super::registry::SessionSnapshot;
use crate::config::{AgentSettings, DEFAULT_KEEPALIVE_INTERVAL_SECONDS, ServerConfig};
use crate::core::llm::{GenerationRequest, ResponseGenerator};
use crate::core::protocol::{
    DecodedFrame, InboundEvent, InstructionBuilder, MediaPayload, OutboundEvent, RelayRoute,
    StartPayload, TranscriptPayload, frame_preview, parse_frame,
};

/// Lifecycle phase of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Pending,
    Active,
    Ended,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Pending => "pending",
            SessionPhase::Active => "active",
            SessionPhase::Ended => "ended",
        }
    }
}

/// Why a session reached [`SessionPhase::Ended`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationCause {
    /// Peer sent a `stop` event
    Stop(Option<String>),
    /// Transport closed by the peer
    TransportClosed,
    /// Transport failed
    TransportError(String),
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::Stop(Some(reason)) => write!(f, "stop ({reason})"),
            TerminationCause::Stop(None) => f.write_str("stop"),
            TerminationCause::TransportClosed => f.write_str("transport closed"),
            TerminationCause::TransportError(e) => write!(f, "transport error: {e}"),
        }
    }
}

/// Per-session tunables derived from the server configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub keepalive_interval: Duration,
    pub system_prompt: String,
    pub fallback_reply: String,
    /// Trailing turns sent with each generation request
    pub history_window: usize,
    /// Transcripts with at most this many characters are noise
    pub min_transcript_chars: usize,
    pub media_sample_rate: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_agent(
            &AgentSettings::default(),
            Duration::from_secs(DEFAULT_KEEPALIVE_INTERVAL_SECONDS),
        )
    }
}

impl SessionSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::from_agent(&config.agent, config.keepalive_interval())
    }

    fn from_agent(agent: &AgentSettings, keepalive_interval: Duration) -> Self {
        Self {
            keepalive_interval,
            system_prompt: agent.system_prompt.clone(),
            fallback_reply: agent.fallback_reply.clone(),
            history_window: agent.history_window,
            min_transcript_chars: agent.min_transcript_chars,
            media_sample_rate: agent.media_sample_rate,
        }
    }
}

/// Shared collaborators handed to every session
#[derive(Clone)]
pub struct SessionServices {
    pub instructions: Arc<InstructionBuilder>,
    pub generator: Arc<dyn ResponseGenerator>,
    pub settings: Arc<SessionSettings>,
}

/// State of one live phone call
pub struct CallSession {
    connection_id: String,
    identity: SessionIdentity,
    phase: SessionPhase,
    has_greeted: bool,
    history: ConversationHistory,
    media_packets: u64,
    peer: PeerKind,
    connected_at: Instant,
    keepalive: Option<KeepAlive>,
    termination: CancellationToken,
    outbound: mpsc::Sender<RelayRoute>,
    services: SessionServices,
}

impl CallSession {
    pub fn new(
        connection_id: impl Into<String>,
        identity: SessionIdentity,
        peer: PeerKind,
        outbound: mpsc::Sender<RelayRoute>,
        services: SessionServices,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            identity,
            phase: SessionPhase::Pending,
            has_greeted: false,
            history: ConversationHistory::new(),
            media_packets: 0,
            peer,
            connected_at: Instant::now(),
            keepalive: None,
            termination: CancellationToken::new(),
            outbound,
            services,
        }
    }

    pub fn session_id(&self) -> &str {
        self.identity.as_str()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_ended(&self) -> bool {
        self.phase == SessionPhase::Ended
    }

    pub fn has_greeted(&self) -> bool {
        self.has_greeted
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn media_packets(&self) -> u64 {
        self.media_packets
    }

    pub fn keepalive_running(&self) -> bool {
        self.keepalive
            .as_ref()
            .is_some_and(|keepalive| !keepalive.is_cancelled())
    }

    /// Token cancelled on the first terminal transition.
    ///
    /// The connection handler cancels it when the transport goes away so
    /// that an in-flight generation is abandoned.
    pub fn termination_token(&self) -> CancellationToken {
        self.termination.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection_id: self.connection_id.clone(),
            session_id: self.identity.as_str().to_string(),
            phase: self.phase,
            has_greeted: self.has_greeted,
            turns: self.history.len(),
            media_packets: self.media_packets,
            peer: self.peer,
            connected_at: self.connected_at,
        }
    }

    /// Start the transport keep-alive. No-op if already started or ended.
    pub fn start_keepalive(&mut self) {
        if self.keepalive.is_some() || self.is_ended() {
            return;
        }

        debug!(
            session_id = %self.identity,
            interval_secs = self.services.settings.keepalive_interval.as_secs(),
            "Starting keep-alive"
        );
        self.keepalive = Some(KeepAlive::spawn(
            self.services.settings.keepalive_interval,
            self.outbound.clone(),
            self.termination.child_token(),
        ));
    }

    /// Handle one inbound text frame.
    ///
    /// Returns `false` once the session has ended and no further frames
    /// should be read.
    pub async fn handle_frame(&mut self, text: &str) -> bool {
        if self.is_ended() {
            debug!(session_id = %self.identity, "Frame after call end ignored");
            return false;
        }

        // Identity is read from any object frame, even one whose payload is rejected
        let decoded = parse_frame(text).and_then(|raw| {
            self.identity.observe(IdentityInputs::from_event(&raw.raw));
            raw.decode()
        });

        match decoded {
            Ok(frame) => self.handle_event(frame).await,
            Err(e) => {
                warn!(
                    session_id = %self.identity,
                    error = %e,
                    frame = %frame_preview(text),
                    "Ignoring malformed frame"
                );
                true
            }
        }
    }

    async fn handle_event(&mut self, frame: DecodedFrame) -> bool {
        match frame.event {
            InboundEvent::Connected => {
                info!(session_id = %self.identity, "Peer handshake received");
                let ack = self.services.instructions.handshake_ack();
                self.send(ack).await;
            }
            InboundEvent::Start { start } => self.on_start(start).await,
            InboundEvent::Media { media } => self.on_media(&media),
            InboundEvent::Transcript { transcript } => self.on_transcript(transcript).await,
            InboundEvent::Mark { mark } => {
                debug!(session_id = %self.identity, mark = ?mark, "Mark received");
            }
            InboundEvent::Stop { reason } => self.on_stop(reason).await,
            InboundEvent::Unknown => {
                debug!(session_id = %self.identity, kind = %frame.kind, "Unhandled event kind");
            }
        }

        !self.is_ended()
    }

    /// End the session because the transport went away.
    ///
    /// Same cleanup as `stop` without a closing protocol event. Returns
    /// `false` if the session had already ended.
    pub fn terminate(&mut self, cause: TerminationCause) -> bool {
        self.end(cause)
    }

    async fn on_start(&mut self, start: StartPayload) {
        if self.phase != SessionPhase::Pending {
            debug!(session_id = %self.identity, "Duplicate start ignored");
            return;
        }

        info!(
            session_id = %self.identity,
            call_sid = ?start.call_sid,
            stream_sid = ?start.stream_sid,
            "Call started"
        );

        if !self.has_greeted {
            let greeting = self.services.instructions.greeting();
            if self.send(greeting).await {
                self.has_greeted = true;
            }
        }

        self.phase = SessionPhase::Active;
    }

    fn on_media(&mut self, media: &MediaPayload) {
        self.media_packets += 1;

        if rand::random::<f64>() < self.services.settings.media_sample_rate {
            info!(
                session_id = %self.identity,
                packets = self.media_packets,
                payload_bytes = media.payload.as_ref().map_or(0, String::len),
                timestamp = ?media.timestamp,
                "Media sample"
            );
        }
    }

    async fn on_transcript(&mut self, transcript: TranscriptPayload) {
        if self.phase != SessionPhase::Active {
            debug!(session_id = %self.identity, "Transcript before call start dropped");
            return;
        }

        let settings = Arc::clone(&self.services.settings);
        let speech = transcript.speech.as_deref().map(str::trim).unwrap_or_default();
        let chars = speech.chars().count();
        if chars <= settings.min_transcript_chars {
            debug!(session_id = %self.identity, chars, "Transcript too short, dropped");
            return;
        }

        info!(
            session_id = %self.identity,
            confidence = ?transcript.confidence,
            is_final = ?transcript.is_final,
            text = %speech,
            "Caller speech"
        );

        let request = GenerationRequest {
            system_prompt: settings.system_prompt.clone(),
            window: self.history.trailing(settings.history_window),
            user_text: speech.to_string(),
        };
        self.history.push(Turn::user(speech));

        let generator = Arc::clone(&self.services.generator);
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;

            _ = self.termination.cancelled() => None,
            result = generator.generate(&request) => Some(result),
        };

        let Some(result) = outcome else {
            info!(session_id = %self.identity, "Transport closed during generation, reply discarded");
            return;
        };

        let reply = match result {
            Ok(reply) => {
                debug!(
                    session_id = %self.identity,
                    latency = ?started.elapsed(),
                    "Reply generated"
                );
                reply
            }
            Err(e) => {
                warn!(session_id = %self.identity, error = %e, "Generation failed, using fallback reply");
                settings.fallback_reply.clone()
            }
        };

        self.history.push(Turn::assistant(reply.as_str()));
        let speech = self.services.instructions.speech(&reply);
        self.send(speech).await;
    }

    async fn on_stop(&mut self, reason: Option<String>) {
        if self.end(TerminationCause::Stop(reason)) && self.outbound.send(RelayRoute::Close).await.is_err() {
            debug!(session_id = %self.identity, "Transport already gone at stop");
        }
    }

    fn end(&mut self, cause: TerminationCause) -> bool {
        if self.is_ended() {
            return false;
        }

        self.phase = SessionPhase::Ended;
        if let Some(keepalive) = self.keepalive.take() {
            keepalive.cancel();
        }
        self.termination.cancel();

        info!(
            session_id = %self.identity,
            cause = %cause,
            turns = self.history.len(),
            media_packets = self.media_packets,
            duration_secs = self.connected_at.elapsed().as_secs(),
            "Call ended"
        );
        true
    }

    async fn send(&self, event: OutboundEvent) -> bool {
        match self.outbound.send(RelayRoute::Outgoing(event)).await {
            Ok(()) => true,
            Err(_) => {
                debug!(session_id = %self.identity, "Outbound channel closed, event dropped");
                false
            }
        }
    }
}
