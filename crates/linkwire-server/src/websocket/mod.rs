//! Live channels over WebSocket: upgrade, frame dispatch, session lifecycle.

pub mod handler;
pub mod messages;
pub mod session;
