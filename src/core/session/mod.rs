//! Per-call session handling
//!
//! - [`identity`]: placeholder id and the ordered call-id resolver
//! - [`machine`]: the `Pending → Active → Ended` state machine
//! - [`keepalive`]: transport ping task owned by a session
//! - [`history`]: conversation turns and the trailing window
//! - [`registry`]: active connection count and diagnostic snapshots

pub mod history;
pub mod identity;
pub mod keepalive;
pub mod machine;
pub mod peer;
pub mod registry;

pub use history::{ConversationHistory, Turn, TurnRole};
pub use identity::{IdentitySource, SessionIdentity, resolve_identity};
pub use keepalive::KeepAlive;
pub use machine::{CallSession, SessionPhase, SessionServices, SessionSettings, TerminationCause};
pub use peer::PeerKind;
pub use registry::{ConnectionGuard, SessionRegistry, SessionSnapshot};
