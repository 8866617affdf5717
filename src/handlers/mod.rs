//! HTTP and WebSocket request handlers
//!
//! - `api` - Health, status and debug endpoints
//! - `relay` - Telephony relay WebSocket

pub mod api;
pub mod relay;

// Re-export commonly used handlers for convenient access
pub use relay::relay_handler;
