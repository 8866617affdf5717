pub mod llm;
pub mod protocol;
pub mod session;

// Re-export commonly used types for convenience
pub use llm::{
    ChatCompletionsClient, GenerationError, GenerationRequest, GenerationResult,
    ResponseGenerator,
};

pub use protocol::{
    DecodedFrame, FrameError, InboundEvent, InstructionBuilder, OutboundEvent, RelayRoute,
    VoiceConfig, decode_frame,
};

pub use session::{
    CallSession, ConnectionGuard, PeerKind, SessionIdentity, SessionPhase, SessionRegistry,
    SessionServices, SessionSettings, SessionSnapshot, TerminationCause, Turn, TurnRole,
};
