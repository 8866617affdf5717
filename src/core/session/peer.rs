use serde::Serialize;

/// User-agent marker sent by the telephony media platform
const TELEPHONY_AGENT_MARKER: &str = "Twilio";

/// Advisory classification of the connecting peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    Telephony,
    Unknown,
}

impl PeerKind {
    /// Classify a peer from its `user-agent` header
    pub fn classify(user_agent: Option<&str>) -> Self {
        match user_agent {
            Some(agent) if agent.contains(TELEPHONY_AGENT_MARKER) => PeerKind::Telephony,
            _ => PeerKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeerKind::Telephony => "telephony",
            PeerKind::Unknown => "unknown",
        }
    }
}
