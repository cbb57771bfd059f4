//! REST surface: connection actions, reconciliation reads, the inbox.

pub mod auth;
pub mod connections;
pub mod error;
pub mod notifications;

use axum::Router;

use crate::server::AppState;

/// All REST routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(connections::routes())
        .merge(notifications::routes())
}
