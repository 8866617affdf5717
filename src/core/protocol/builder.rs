//! Outbound instruction builder
//!
//! Speak events come in two shapes: a minimal one carrying only text (the
//! peer applies its default synthesis) and a fully configured one carrying
//! the complete voice block. Which one is built is decided once, from the
//! presence of the voice credential.

use crate::config::{ServerConfig, VoiceSettings};

use super::events::{OutboundEvent, VoiceConfig};

/// Builds protocol-compliant outbound events for one process configuration
#[derive(Debug, Clone)]
pub struct InstructionBuilder {
    greeting: String,
    voice: Option<VoiceConfig>,
}

impl InstructionBuilder {
    /// Create a builder. `voice` is `Some` only when the voice credential is configured.
    pub fn new(greeting: impl Into<String>, voice: Option<&VoiceSettings>) -> Self {
        Self {
            greeting: greeting.into(),
            voice: voice.map(VoiceConfig::from),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let voice = config
            .has_voice_credential()
            .then_some(&config.voice);
        Self::new(config.agent.greeting.clone(), voice)
    }

    /// Whether speak events carry the voice block
    pub fn has_voice_config(&self) -> bool {
        self.voice.is_some()
    }

    pub fn handshake_ack(&self) -> OutboundEvent {
        OutboundEvent::Connected
    }

    /// Speak event with the fixed welcome message
    pub fn greeting(&self) -> OutboundEvent {
        self.speech(&self.greeting)
    }

    pub fn speech(&self, text: &str) -> OutboundEvent {
        match &self.voice {
            Some(voice) => configured_speech(text, voice),
            None => minimal_speech(text),
        }
    }
}

fn minimal_speech(text: &str) -> OutboundEvent {
    OutboundEvent::Speak {
        text: text.to_string(),
        config: None,
    }
}

fn configured_speech(text: &str, voice: &VoiceConfig) -> OutboundEvent {
    OutboundEvent::Speak {
        text: text.to_string(),
        config: Some(voice.clone()),
    }
}
