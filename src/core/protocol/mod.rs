//! Telephony relay protocol
//!
//! # Peer → Relay
//!
//! - **connected**: handshake request
//! - **start**: call begin (`start.callSid`, `start.streamSid`)
//! - **media**: inbound audio chunk (counted, never decoded)
//! - **transcript**: recognized speech (`speech`, `confidence`, `is_final`)
//! - **mark**: playback progress marker
//! - **stop**: call end (`reason`)
//!
//! # Relay → Peer
//!
//! - **connected**: handshake acknowledgement
//! - **speak**: speech instruction with optional voice block

pub mod builder;
pub mod decoder;
pub mod events;

pub use builder::InstructionBuilder;
pub use decoder::{DecodedFrame, FrameError, RawFrame, decode_frame, frame_preview, parse_frame};
pub use events::{
    InboundEvent, MediaPayload, OutboundEvent, RelayRoute, StartPayload, TranscriptPayload,
    VoiceConfig,
};
