//! # linkwire-server
//!
//! Axum HTTP + WebSocket server for the connection network.
//!
//! - [`service::ConnectionService`]: validates and applies connection actions
//!   with compare-and-swap retries, then publishes one event per participant
//! - [`fanout::EventFanout`]: persists each event to the recipient's inbox
//!   before pushing it to their live channels
//! - [`presence::PresenceRegistry`]: user → live channels, with heartbeat and
//!   sweeper eviction
//! - [`reconcile::ReconciliationEndpoint`]: store-backed status and list reads
//! - [`server::LinkwireServer`]: router, listener and shutdown wiring

#![deny(unsafe_code)]

pub mod config;
pub mod delivery;
pub mod directory;
pub mod errors;
pub mod fanout;
pub mod health;
pub mod http;
pub mod metrics;
pub mod presence;
pub mod reconcile;
pub mod server;
pub mod service;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use directory::{OpenDirectory, ProfileDirectory, StaticDirectory};
pub use server::{AppState, LinkwireServer};
