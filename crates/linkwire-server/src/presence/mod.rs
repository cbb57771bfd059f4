//! Live channels: per-socket state, liveness, and the user → channels map.

pub mod channel;
pub mod heartbeat;
pub mod registry;

pub use channel::{ClientChannel, PushOutcome};
pub use heartbeat::{HeartbeatResult, run_heartbeat};
pub use registry::{Eviction, PresenceRegistry, Registration};
