//! `/connections` routes.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Router;
use linkwire_core::{ConnectionStatus, UserId, ViewerStatus};
use serde::{Deserialize, Serialize};

use super::auth::AuthUser;
use super::error::ApiError;
use crate::reconcile::UserList;
use crate::server::AppState;
use crate::service::ActionOutcome;

/// Body of request, cancel and disconnect.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetBody {
    /// The other user.
    pub target_user_id: UserId,
}

/// Body of accept and reject.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterBody {
    /// Who sent the request being answered.
    pub request_from_user_id: UserId,
}

/// Response to every action.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    /// `none`, `pending` or `connected`.
    pub status: ConnectionStatus,
    /// The caller's view.
    pub viewer_status: ViewerStatus,
    /// Record version.
    pub version: u64,
    /// Whether anything was written.
    pub changed: bool,
}

impl From<ActionOutcome> for ActionResponse {
    fn from(outcome: ActionOutcome) -> Self {
        Self {
            status: outcome.status,
            viewer_status: outcome.viewer_status,
            version: outcome.version,
            changed: outcome.changed,
        }
    }
}

/// `{status}` for the status lookup.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// The caller's view of the pair.
    pub status: ViewerStatus,
}

/// `{connections}`: every related user and the caller's side of it.
#[derive(Debug, Serialize)]
pub struct StatusMapResponse {
    /// User id to viewer status.
    pub connections: BTreeMap<UserId, ViewerStatus>,
}

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/connections", get(list_connections))
        .route("/connections/status", get(status_map))
        .route("/connections/{user_id}", get(list_connections_of))
        .route("/connections/requests", get(list_incoming))
        .route("/connections/pending", get(list_outgoing))
        .route("/connections/request", post(request))
        .route("/connections/cancel", post(cancel))
        .route("/connections/accept", post(accept))
        .route("/connections/reject", post(reject))
        .route("/connections/disconnect", post(disconnect))
        .route("/connections/status/{other_user_id}", get(status))
}

type ActionResult = Result<Json<ActionResponse>, ApiError>;

async fn request(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    body: Result<Json<TargetBody>, JsonRejection>,
) -> ActionResult {
    let Json(body) = body?;
    let outcome = state.service.request_connect(&actor, &body.target_user_id).await?;
    Ok(Json(outcome.into()))
}

async fn cancel(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    body: Result<Json<TargetBody>, JsonRejection>,
) -> ActionResult {
    let Json(body) = body?;
    let outcome = state.service.cancel(&actor, &body.target_user_id).await?;
    Ok(Json(outcome.into()))
}

async fn accept(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    body: Result<Json<RequesterBody>, JsonRejection>,
) -> ActionResult {
    let Json(body) = body?;
    let outcome = state.service.accept(&actor, &body.request_from_user_id).await?;
    Ok(Json(outcome.into()))
}

async fn reject(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    body: Result<Json<RequesterBody>, JsonRejection>,
) -> ActionResult {
    let Json(body) = body?;
    let outcome = state.service.reject(&actor, &body.request_from_user_id).await?;
    Ok(Json(outcome.into()))
}

async fn disconnect(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    body: Result<Json<TargetBody>, JsonRejection>,
) -> ActionResult {
    let Json(body) = body?;
    let outcome = state.service.disconnect(&actor, &body.target_user_id).await?;
    Ok(Json(outcome.into()))
}

async fn status(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Path(other): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state.reconcile.status_of(&viewer, &UserId::from(other))?;
    Ok(Json(StatusResponse { status }))
}

async fn list_connections(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<UserList>, ApiError> {
    Ok(Json(state.reconcile.connections(&user)?))
}

async fn list_incoming(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<UserList>, ApiError> {
    Ok(Json(state.reconcile.incoming_requests(&user)?))
}

async fn list_outgoing(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<UserList>, ApiError> {
    Ok(Json(state.reconcile.outgoing_requests(&user)?))
}

async fn status_map(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
) -> Result<Json<StatusMapResponse>, ApiError> {
    let connections = state.reconcile.all_statuses(&viewer)?;
    Ok(Json(StatusMapResponse { connections }))
}

async fn list_connections_of(
    State(state): State<AppState>,
    AuthUser(_viewer): AuthUser,
    Path(user): Path<String>,
) -> Result<Json<UserList>, ApiError> {
    let user = UserId::from(user);
    if state.directory.profile(&user).await.is_none() {
        return Err(ApiError::NotFound(format!("user {user} not found")));
    }
    Ok(Json(state.reconcile.connections(&user)?))
}
