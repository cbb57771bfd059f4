//! `SQLite` backend.
//!
//! - **[`connection`]**: `r2d2` pool with WAL, busy timeout and foreign keys
//!   applied to every connection
//! - **[`migrations`]**: version-tracked schema, embedded at compile time
//! - **[`row_types`]**: raw row structs and conversion to domain types
//! - **[`repositories`]**: stateless SQL, one struct per table

pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod row_types;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, PragmaState, new_file, new_in_memory,
    verify_pragmas,
};
pub use migrations::{current_version, latest_version, run_migrations};
