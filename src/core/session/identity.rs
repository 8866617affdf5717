//! Session identity resolution
//!
//! A call starts with a `TEMP_<unix millis>` placeholder id. The first
//! non-blank call identifier found by walking [`PRECEDENCE`] replaces it, and
//! every later candidate is ignored.

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::info;

/// Prefix of placeholder session ids
pub const PLACEHOLDER_PREFIX: &str = "TEMP_";

/// Query parameter carrying the call identifier
pub const CALL_SID_PARAM: &str = "callSid";

/// Where a session id was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// `callSid` in the connection URL query
    UrlQuery,
    /// `start.callSid` in a start event
    StartEvent,
    /// Top-level `callSid` on any event
    EventField,
    /// `call.callSid` or `call.sid` on any event
    CallObject,
}

/// Lookup order, highest priority first
pub const PRECEDENCE: [IdentitySource; 4] = [
    IdentitySource::UrlQuery,
    IdentitySource::StartEvent,
    IdentitySource::EventField,
    IdentitySource::CallObject,
];

impl IdentitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentitySource::UrlQuery => "url_query",
            IdentitySource::StartEvent => "start_event",
            IdentitySource::EventField => "event_field",
            IdentitySource::CallObject => "call_object",
        }
    }

    fn lookup(&self, inputs: &IdentityInputs<'_>) -> Option<String> {
        let candidate = match self {
            IdentitySource::UrlQuery => inputs
                .query
                .and_then(|query| query.get(CALL_SID_PARAM))
                .map(String::as_str),
            IdentitySource::StartEvent => inputs
                .event
                .filter(|event| event.get("event").and_then(Value::as_str) == Some("start"))
                .and_then(|event| event.pointer("/start/callSid"))
                .and_then(Value::as_str),
            IdentitySource::EventField => inputs
                .event
                .and_then(|event| event.get("callSid"))
                .and_then(Value::as_str),
            IdentitySource::CallObject => inputs.event.and_then(|event| {
                event
                    .pointer("/call/callSid")
                    .and_then(Value::as_str)
                    .or_else(|| event.pointer("/call/sid").and_then(Value::as_str))
            }),
        };

        candidate
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs consulted by the resolver. Either side may be absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityInputs<'a> {
    pub query: Option<&'a HashMap<String, String>>,
    pub event: Option<&'a Value>,
}

impl<'a> IdentityInputs<'a> {
    pub fn from_query(query: &'a HashMap<String, String>) -> Self {
        Self {
            query: Some(query),
            event: None,
        }
    }

    pub fn from_event(event: &'a Value) -> Self {
        Self {
            query: None,
            event: Some(event),
        }
    }
}

/// Walk the precedence table and return the first usable candidate.
pub fn resolve_identity(inputs: IdentityInputs<'_>) -> Option<(IdentitySource, String)> {
    PRECEDENCE
        .iter()
        .find_map(|source| source.lookup(&inputs).map(|id| (*source, id)))
}

/// Generate a fresh placeholder id
pub fn placeholder_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("{PLACEHOLDER_PREFIX}{millis}")
}

/// The current id of one call session
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    current: String,
    source: Option<IdentitySource>,
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionIdentity {
    /// Start with a placeholder id
    pub fn new() -> Self {
        Self {
            current: placeholder_id(),
            source: None,
        }
    }

    /// Identity at connection accept, consulting the URL query
    pub fn from_connection(query: &HashMap<String, String>) -> Self {
        let mut identity = Self::new();
        identity.observe(IdentityInputs::from_query(query));
        identity
    }

    pub fn as_str(&self) -> &str {
        &self.current
    }

    /// Whether the placeholder was replaced
    pub fn is_resolved(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<IdentitySource> {
        self.source
    }

    /// Offer new inputs to the resolver.
    ///
    /// Returns `true` if the id was upgraded. A resolved id never changes.
    pub fn observe(&mut self, inputs: IdentityInputs<'_>) -> bool {
        if self.is_resolved() {
            return false;
        }

        let Some((source, id)) = resolve_identity(inputs) else {
            return false;
        };

        info!(
            previous = %self.current,
            session_id = %id,
            source = %source,
            "Session identity resolved"
        );
        self.current = id;
        self.source = Some(source);
        true
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.current)
    }
}
