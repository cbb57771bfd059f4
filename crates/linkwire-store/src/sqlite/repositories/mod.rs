//! Stateless repositories.
//!
//! Each method takes a `&Connection`, so the same code runs against a pooled
//! connection or inside a transaction.

pub mod connection;
pub mod notification;

pub use connection::ConnectionRepo;
pub use notification::NotificationRepo;
