//! # linkwire-store
//!
//! Persistence for connection records and notifications.
//!
//! - [`ConnectionStore`]: versioned get and compare-and-swap of the single
//!   record kept per unordered pair
//! - [`NotificationStore`]: the durable notification inbox
//! - [`SqliteStore`]: both traits over a pooled `SQLite` database

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod store;
pub mod types;

pub use errors::{Result, StoreError};
pub use sqlite::ConnectionConfig;
pub use store::{ConnectionStore, NotificationStore, SqliteStore};
pub use types::{NotificationQuery, NotificationRecord};
