//! Inbound frame decoding
//!
//! A frame is decoded in two steps: [`parse_frame`] yields a generic JSON
//! object with its `event` discriminator (kept as `raw` for identity
//! resolution and logging), then [`RawFrame::decode`] produces the typed
//! [`InboundEvent`].

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::events::InboundEvent;

/// Maximum number of characters of a rejected frame kept for logging
pub const FRAME_PREVIEW_CHARS: usize = 200;

/// Errors produced while decoding an inbound frame.
///
/// None of these are fatal to the connection.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    /// Frame is not valid JSON
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// Frame is valid JSON but not an object
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// Discriminator field absent or not a string
    #[error("Missing or non-string 'event' field")]
    MissingEventKind,

    /// Known event kind with a payload of the wrong shape
    #[error("Invalid '{kind}' payload: {reason}")]
    InvalidPayload { kind: String, reason: String },
}

/// A JSON object frame carrying a string discriminator
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub kind: String,
    pub raw: Value,
}

impl RawFrame {
    /// Decode the typed event
    pub fn decode(self) -> Result<DecodedFrame, FrameError> {
        let event = InboundEvent::deserialize(&self.raw).map_err(|e| FrameError::InvalidPayload {
            kind: self.kind.clone(),
            reason: e.to_string(),
        })?;

        Ok(DecodedFrame {
            kind: self.kind,
            event,
            raw: self.raw,
        })
    }
}

/// A successfully decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Discriminator exactly as sent by the peer
    pub kind: String,
    pub event: InboundEvent,
    /// The frame as a generic JSON object
    pub raw: Value,
}

/// Parse one text frame up to its discriminator
pub fn parse_frame(text: &str) -> Result<RawFrame, FrameError> {
    let raw: Value = serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;

    if !raw.is_object() {
        return Err(FrameError::NotAnObject);
    }

    let kind = raw
        .get("event")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingEventKind)?
        .to_string();

    Ok(RawFrame { kind, raw })
}

/// Decode one text frame
pub fn decode_frame(text: &str) -> Result<DecodedFrame, FrameError> {
    parse_frame(text)?.decode()
}

/// Truncate a frame for logging without splitting a UTF-8 character
pub fn frame_preview(text: &str) -> String {
    match text.char_indices().nth(FRAME_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_frame() {
        let frame = decode_frame(r#"{"event":"connected"}"#).unwrap();
        assert_eq!(frame.kind, "connected");
        assert_eq!(frame.event, InboundEvent::Connected);
        assert!(frame.raw.is_object());
    }

    #[test]
    fn test_decode_keeps_unknown_kind_name() {
        let frame = decode_frame(r#"{"event":"interrupt","utteranceUntilInterrupt":"x"}"#).unwrap();
        assert_eq!(frame.kind, "interrupt");
        assert_eq!(frame.event, InboundEvent::Unknown);
    }

    #[test]
    fn test_decode_invalid_json() {
        let err = decode_frame("{not json").unwrap_err();
        assert!(matches!(err, FrameError::InvalidJson(_)));
    }

    #[test]
    fn test_decode_non_object() {
        assert_eq!(decode_frame("[1,2,3]").unwrap_err(), FrameError::NotAnObject);
        assert_eq!(decode_frame("\"start\"").unwrap_err(), FrameError::NotAnObject);
    }

    #[test]
    fn test_decode_missing_discriminator() {
        assert_eq!(
            decode_frame(r#"{"start":{"callSid":"CA1"}}"#).unwrap_err(),
            FrameError::MissingEventKind
        );
        assert_eq!(
            decode_frame(r#"{"event":42}"#).unwrap_err(),
            FrameError::MissingEventKind
        );
    }

    #[test]
    fn test_decode_invalid_payload_shape() {
        let err = decode_frame(r#"{"event":"transcript","transcript":"hello"}"#).unwrap_err();
        match err {
            FrameError::InvalidPayload { kind, .. } => assert_eq!(kind, "transcript"),
            other => panic!("Expected InvalidPayload, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_keeps_raw_when_payload_is_invalid() {
        let frame = parse_frame(r#"{"event":"transcript","transcript":"hello","callSid":"CA9"}"#)
            .unwrap();
        assert_eq!(frame.kind, "transcript");
        assert_eq!(frame.raw["callSid"], "CA9");
        assert!(frame.decode().is_err());
    }

    #[test]
    fn test_frame_preview_truncates() {
        let long = "é".repeat(FRAME_PREVIEW_CHARS + 50);
        let preview = frame_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), FRAME_PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_frame_preview_short_input_unchanged() {
        assert_eq!(frame_preview("short"), "short");
    }
}
