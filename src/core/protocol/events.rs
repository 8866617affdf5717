//! Relay WebSocket event types
//!
//! Every frame exchanged with the telephony peer is a JSON object carrying an
//! `event` discriminator. Inbound kinds are `connected`, `start`, `media`,
//! `transcript`, `mark` and `stop`; any other kind decodes to
//! [`InboundEvent::Unknown`]. Outbound kinds are `connected` and `speak`.

use serde::{Deserialize, Serialize};

use crate::config::VoiceSettings;

// =============================================================================
// Inbound Events (Peer -> Relay)
// =============================================================================

/// Inbound events from the telephony peer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundEvent {
    /// Handshake request; answered with a `connected` ack
    Connected,

    /// Call begin with stream/session metadata
    Start {
        #[serde(default, deserialize_with = "lenient::payload")]
        start: StartPayload,
    },

    /// Inbound audio chunk (never decoded)
    Media {
        #[serde(default, deserialize_with = "lenient::payload")]
        media: MediaPayload,
    },

    /// Recognized speech
    Transcript {
        #[serde(default)]
        transcript: TranscriptPayload,
    },

    /// Playback progress marker
    Mark {
        #[serde(default)]
        mark: Option<serde_json::Value>,
    },

    /// Call end
    Stop {
        #[serde(default, deserialize_with = "lenient::text")]
        reason: Option<String>,
    },

    /// Any discriminator this relay does not handle
    #[serde(other)]
    Unknown,
}

/// Payload of a `start` event
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StartPayload {
    #[serde(rename = "callSid", default, deserialize_with = "lenient::text")]
    pub call_sid: Option<String>,
    #[serde(rename = "streamSid", default, deserialize_with = "lenient::text")]
    pub stream_sid: Option<String>,
}

/// Payload of a `media` event
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MediaPayload {
    /// Base64 audio chunk
    #[serde(default, deserialize_with = "lenient::text")]
    pub payload: Option<String>,
    /// Peer timestamp (string or number depending on the peer)
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

/// Payload of a `transcript` event
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TranscriptPayload {
    #[serde(default, deserialize_with = "lenient::text")]
    pub speech: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_final: Option<bool>,
}

/// Field decoders that never reject a frame over a secondary field.
///
/// Peers differ in how they type metadata (`"0.9"` vs `0.9`, numeric sids),
/// and the event kind alone decides the session transition.
mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Strings as-is, numbers and booleans as their text, anything else unset
    pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Numbers or numeric strings
    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// Booleans or `"true"` / `"false"`
    pub fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Bool(b) => Some(b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// Whole payload object, or its default when the shape is unexpected
    pub fn payload<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }
}

// =============================================================================
// Outbound Events (Relay -> Peer)
// =============================================================================

/// Outbound events to the telephony peer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundEvent {
    /// Handshake acknowledgement
    Connected,

    /// Speech instruction
    Speak {
        text: String,
        /// Voice tuning; omitted entirely when no voice credential is configured
        #[serde(skip_serializing_if = "Option::is_none")]
        config: Option<VoiceConfig>,
    },
}

/// Voice block of a speak event. All fields are always populated together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceConfig {
    pub provider: String,
    pub voice_id: String,
    pub stability: f32,
    pub similarity: f32,
    pub style: f32,
    pub speed: f32,
    pub audio_format: String,
}

impl From<&VoiceSettings> for VoiceConfig {
    fn from(settings: &VoiceSettings) -> Self {
        Self {
            provider: settings.provider.clone(),
            voice_id: settings.voice_id.clone(),
            stability: settings.stability,
            similarity: settings.similarity,
            style: settings.style,
            speed: settings.speed,
            audio_format: settings.audio_format.clone(),
        }
    }
}

// =============================================================================
// Message Routing
// =============================================================================

/// Items queued for the connection's sender task
#[derive(Debug, Clone, PartialEq)]
pub enum RelayRoute {
    /// JSON text event
    Outgoing(OutboundEvent),
    /// Transport-level keep-alive ping
    Ping,
    /// Close the connection from this side
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_event_deserialization() {
        let json = r#"{
            "event": "start",
            "start": {"callSid": "CA123", "streamSid": "MZ456", "tracks": ["inbound"]}
        }"#;

        let event: InboundEvent = serde_json::from_str(json).expect("Should deserialize");
        match event {
            InboundEvent::Start { start } => {
                assert_eq!(start.call_sid.as_deref(), Some("CA123"));
                assert_eq!(start.stream_sid.as_deref(), Some("MZ456"));
            }
            _ => panic!("Expected Start variant"),
        }
    }

    #[test]
    fn test_start_event_without_payload() {
        let event: InboundEvent = serde_json::from_str(r#"{"event":"start"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Start {
                start: StartPayload::default()
            }
        );
    }

    #[test]
    fn test_transcript_event_deserialization() {
        let json = r#"{
            "event": "transcript",
            "transcript": {"speech": "quero agendar", "confidence": 0.92, "is_final": true}
        }"#;

        let event: InboundEvent = serde_json::from_str(json).expect("Should deserialize");
        match event {
            InboundEvent::Transcript { transcript } => {
                assert_eq!(transcript.speech.as_deref(), Some("quero agendar"));
                assert_eq!(transcript.confidence, Some(0.92));
                assert_eq!(transcript.is_final, Some(true));
            }
            _ => panic!("Expected Transcript variant"),
        }
    }

    #[test]
    fn test_connected_event_ignores_extra_fields() {
        let json = r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, InboundEvent::Connected);
    }

    #[test]
    fn test_unknown_event_kind() {
        let event: InboundEvent = serde_json::from_str(r#"{"event":"dtmf","digit":"1"}"#).unwrap();
        assert_eq!(event, InboundEvent::Unknown);
    }

    #[test]
    fn test_stop_event_reason() {
        let event: InboundEvent =
            serde_json::from_str(r#"{"event":"stop","reason":"completed"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Stop {
                reason: Some("completed".to_string())
            }
        );
    }

    #[test]
    fn test_secondary_fields_of_unexpected_type() {
        let event: InboundEvent =
            serde_json::from_str(r#"{"event":"stop","reason":{"code":1000}}"#).unwrap();
        assert_eq!(event, InboundEvent::Stop { reason: None });

        let event: InboundEvent =
            serde_json::from_str(r#"{"event":"start","start":{"callSid":"CA1","streamSid":42}}"#)
                .unwrap();
        assert_eq!(
            event,
            InboundEvent::Start {
                start: StartPayload {
                    call_sid: Some("CA1".to_string()),
                    stream_sid: Some("42".to_string()),
                }
            }
        );

        let json = r#"{"event":"transcript","transcript":{"speech":"quero agendar","confidence":"0.9","is_final":"yes"}}"#;
        match serde_json::from_str::<InboundEvent>(json).unwrap() {
            InboundEvent::Transcript { transcript } => {
                assert_eq!(transcript.speech.as_deref(), Some("quero agendar"));
                assert_eq!(transcript.confidence, Some(0.9));
                assert_eq!(transcript.is_final, None);
            }
            other => panic!("Expected Transcript variant, got {other:?}"),
        }
    }

    #[test]
    fn test_start_payload_of_unexpected_shape() {
        let event: InboundEvent = serde_json::from_str(r#"{"event":"start","start":"CA1"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Start {
                start: StartPayload::default()
            }
        );
    }

    #[test]
    fn test_connected_ack_serialization() {
        let json = serde_json::to_string(&OutboundEvent::Connected).unwrap();
        assert_eq!(json, r#"{"event":"connected"}"#);
    }

    #[test]
    fn test_minimal_speak_serialization() {
        let event = OutboundEvent::Speak {
            text: "Olá".to_string(),
            config: None,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"speak","text":"Olá"}"#);
    }

    #[test]
    fn test_configured_speak_serialization() {
        let event = OutboundEvent::Speak {
            text: "Olá".to_string(),
            config: Some(VoiceConfig::from(&VoiceSettings::default())),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "speak");
        assert_eq!(value["config"]["provider"], "elevenlabs");
        assert_eq!(value["config"]["voice_id"], "FGY2WhTYpPnrIDTdsKH5");
        assert_eq!(value["config"]["audio_format"], "ulaw_8000");
        assert!(value["config"]["stability"].is_number());
        assert!(value["config"]["similarity"].is_number());
        assert!(value["config"]["style"].is_number());
        assert!(value["config"]["speed"].is_number());
    }
}
