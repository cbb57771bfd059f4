//! `/notifications` routes: the caller's inbox.

use axum::Json;
use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use linkwire_core::NotificationId;
use linkwire_store::{NotificationQuery, NotificationRecord};
use serde::{Deserialize, Serialize};

use super::auth::AuthUser;
use super::error::ApiError;
use crate::server::AppState;

/// Largest page a caller may ask for.
pub const MAX_PAGE: u32 = 200;

/// Query string of the inbox listing.
#[derive(Debug, Default, Deserialize)]
pub struct InboxParams {
    /// Only unread entries.
    #[serde(default)]
    pub unread: bool,
    /// Page size; defaults to 50, clamped to `1..=200`.
    pub limit: Option<u32>,
}

impl InboxParams {
    fn query(&self) -> NotificationQuery {
        let default = NotificationQuery::default();
        NotificationQuery {
            unread_only: self.unread,
            limit: self.limit.unwrap_or(default.limit).clamp(1, MAX_PAGE),
        }
    }
}

/// Inbox page.
#[derive(Debug, Serialize)]
pub struct InboxResponse {
    /// Entries, newest first.
    pub notifications: Vec<NotificationRecord>,
    /// Total unread entries.
    pub unread: u64,
}

/// `{unread}`.
#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    /// Total unread entries.
    pub unread: u64,
}

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list))
        .route("/notifications/count", get(count))
        .route("/notifications/read-all", post(read_all))
        .route("/notifications/{id}/read", post(read_one))
}

async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    params: Result<Query<InboxParams>, QueryRejection>,
) -> Result<Json<InboxResponse>, ApiError> {
    let Query(params) = params?;
    let notifications = state.notifications.list(&user, &params.query())?;
    let unread = state.notifications.unread_count(&user)?;
    Ok(Json(InboxResponse { notifications, unread }))
}

async fn count(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<UnreadResponse>, ApiError> {
    let unread = state.notifications.unread_count(&user)?;
    Ok(Json(UnreadResponse { unread }))
}

async fn read_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = NotificationId::from(id);
    if state.notifications.mark_read(&user, &id)? {
        Ok(Json(serde_json::json!({ "read": true })))
    } else {
        Err(ApiError::NotFound(format!("notification {id} not found")))
    }
}

async fn read_all(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state.notifications.mark_all_read(&user)?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}
