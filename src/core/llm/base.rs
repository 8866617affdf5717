//! Base trait and types for reply generation.
//!
//! The relay only depends on the calling contract: given the system
//! instructions, a bounded window of recent turns and the latest utterance,
//! a generator returns reply text or an error. Prompt content and model
//! selection live in configuration.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::session::Turn;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while generating a reply.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Transport-level failure talking to the backend
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Backend answered with a non-success status
    #[error("Upstream returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// No response within the configured timeout
    #[error("Generation timed out after {0}s")]
    Timeout(u64),

    /// Response body could not be interpreted
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Response contained no usable text
    #[error("Empty reply")]
    EmptyReply,
}

/// Result type for generation operations.
pub type GenerationResult<T> = Result<T, GenerationError>;

// =============================================================================
// Request
// =============================================================================

/// One generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    /// Trailing conversation turns preceding `user_text`, oldest first
    pub window: Vec<Turn>,
    /// Latest user utterance
    pub user_text: String,
}

// =============================================================================
// Generator Trait
// =============================================================================

/// A request/response text generator.
///
/// Implementations own their timeouts; the caller treats a timeout like any
/// other error.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generate the reply for `request`
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult<String>;

    /// Whether upstream credentials are configured
    fn is_configured(&self) -> bool {
        true
    }
}
