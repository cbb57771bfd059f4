//! Connection actions: validate, transition, compare-and-swap, publish.
//!
//! Every action reads the pair's snapshot, runs the state machine, and writes
//! the successor back only if nobody else wrote in between. A lost race is
//! retried from a fresh read, so two users sending each other a request at
//! the same moment end up connected rather than with two pending requests.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use linkwire_core::{
    ConnectionAction, ConnectionEvent, ConnectionEventKind, ConnectionRecord, ConnectionStatus,
    PairKey, ProfileSummary, TransitionOutcome, UserId, ViewerStatus, transition,
};
use linkwire_store::ConnectionStore;
use metrics::{counter, histogram};
use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info, instrument, warn};

use crate::directory::ProfileDirectory;
use crate::errors::{Result, ServiceError};
use crate::fanout::EventFanout;
use crate::metrics::{
    CONNECTION_ACTION_DURATION_SECONDS, CONNECTION_ACTIONS_TOTAL, CONNECTION_CAS_CONFLICTS_TOTAL,
};

/// Result of a connection action, from the actor's point of view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    /// Stored status of the pair after the action.
    pub status: ConnectionStatus,
    /// The actor's view of the pair.
    pub viewer_status: ViewerStatus,
    /// Record version after the action (0 if no record exists).
    pub version: u64,
    /// Whether anything was written.
    pub changed: bool,
    /// Event produced, if anything changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<ConnectionEventKind>,
}

/// Applies connection actions.
pub struct ConnectionService {
    connections: Arc<dyn ConnectionStore>,
    directory: Arc<dyn ProfileDirectory>,
    fanout: Arc<EventFanout>,
    max_attempts: u32,
    pushes: TaskTracker,
}

impl ConnectionService {
    /// Create a service. `max_attempts` is clamped to at least 1. Pushes to
    /// the non-acting participant run on `pushes`.
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        directory: Arc<dyn ProfileDirectory>,
        fanout: Arc<EventFanout>,
        max_attempts: u32,
        pushes: TaskTracker,
    ) -> Self {
        Self {
            connections,
            directory,
            fanout,
            max_attempts: max_attempts.max(1),
            pushes,
        }
    }

    /// Send a request to `other`, or accept theirs if one is pending.
    pub async fn request_connect(&self, actor: &UserId, other: &UserId) -> Result<ActionOutcome> {
        self.apply(actor, other, ConnectionAction::Connect).await
    }

    /// Withdraw the actor's pending request to `other`.
    pub async fn cancel(&self, actor: &UserId, other: &UserId) -> Result<ActionOutcome> {
        self.apply(actor, other, ConnectionAction::Cancel).await
    }

    /// Accept the request `other` sent to the actor.
    pub async fn accept(&self, actor: &UserId, other: &UserId) -> Result<ActionOutcome> {
        self.apply(actor, other, ConnectionAction::Accept).await
    }

    /// Decline the request `other` sent to the actor.
    pub async fn reject(&self, actor: &UserId, other: &UserId) -> Result<ActionOutcome> {
        self.apply(actor, other, ConnectionAction::Reject).await
    }

    /// Remove the connection between the actor and `other`.
    pub async fn disconnect(&self, actor: &UserId, other: &UserId) -> Result<ActionOutcome> {
        self.apply(actor, other, ConnectionAction::Disconnect).await
    }

    /// Apply `action` by `actor` to the pair `{actor, other}`.
    #[instrument(skip_all, fields(actor = %actor, other = %other, action = %action))]
    pub async fn apply(
        &self,
        actor: &UserId,
        other: &UserId,
        action: ConnectionAction,
    ) -> Result<ActionOutcome> {
        let started = Instant::now();
        let result = self.apply_inner(actor, other, action).await;

        let outcome = match &result {
            Ok(o) if o.changed => "changed",
            Ok(_) => "noop",
            Err(e) => e.code(),
        };
        counter!(CONNECTION_ACTIONS_TOTAL, "action" => action.as_str(), "outcome" => outcome)
            .increment(1);
        histogram!(CONNECTION_ACTION_DURATION_SECONDS, "action" => action.as_str())
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn apply_inner(
        &self,
        actor: &UserId,
        other: &UserId,
        action: ConnectionAction,
    ) -> Result<ActionOutcome> {
        if actor == other {
            return Err(ServiceError::InvalidTarget {
                message: "cannot act on a connection with yourself".into(),
            });
        }
        if other.trim().is_empty() {
            return Err(ServiceError::InvalidTarget {
                message: "target user id is empty".into(),
            });
        }
        let other_profile = self
            .directory
            .profile(other)
            .await
            .ok_or_else(|| ServiceError::NotFound {
                user_id: other.clone(),
            })?;

        let pair = PairKey::new(actor, other);
        for attempt in 1..=self.max_attempts {
            let current = self.connections.get(&pair)?;
            let (status, requested_by) = current.as_ref().map_or((ConnectionStatus::None, None), |r| {
                (r.status, r.requested_by.as_ref())
            });

            let next = transition(status, requested_by, actor, other, action)?;
            let TransitionOutcome::Changed(kind) = next.outcome else {
                debug!(%status, "action is a no-op");
                return Ok(ActionOutcome {
                    status: next.status,
                    viewer_status: ViewerStatus::from_parts(
                        next.status,
                        next.requested_by.as_ref(),
                        actor,
                    ),
                    version: current.map_or(0, |r| r.version),
                    changed: false,
                    event: None,
                });
            };

            let now = Utc::now();
            let record = match &current {
                Some(r) => r.successor(&next, now),
                None => ConnectionRecord::first(pair.clone(), &next, now),
            };
            let expected = current.as_ref().map(|r| r.version);

            match self.connections.compare_and_swap(&pair, expected, &record) {
                Ok(version) => {
                    info!(%pair, event = %kind, version, attempt, "connection changed");
                    self.publish(kind, actor, other, &record, other_profile).await;
                    return Ok(ActionOutcome {
                        status: record.status,
                        viewer_status: ViewerStatus::of(Some(&record), actor, other),
                        version,
                        changed: true,
                        event: Some(kind),
                    });
                }
                Err(e) if e.is_conflict() => {
                    counter!(CONNECTION_CAS_CONFLICTS_TOTAL).increment(1);
                    debug!(attempt, ?expected, "lost compare-and-swap, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(attempts = self.max_attempts, "giving up after repeated conflicts");
        Err(ServiceError::Contention {
            attempts: self.max_attempts,
        })
    }

    /// One event per participant, each with its own view and count.
    ///
    /// Both inbox entries are written before the action returns. The actor's
    /// channels are pushed inline; the other participant's push runs in the
    /// background so a slow tab on their side never delays the actor.
    async fn publish(
        &self,
        kind: ConnectionEventKind,
        actor: &UserId,
        other: &UserId,
        record: &ConnectionRecord,
        other_profile: ProfileSummary,
    ) {
        let actor_profile = self
            .directory
            .profile(actor)
            .await
            .unwrap_or_else(|| ProfileSummary::bare(actor));

        let event_for = |recipient: &UserId, counterpart: &UserId, counterpart_profile| ConnectionEvent {
            kind,
            recipient: recipient.clone(),
            counterpart: counterpart.clone(),
            actor: actor.clone(),
            status: ViewerStatus::of(Some(record), recipient, counterpart),
            connection_count: self.connected_count(recipient),
            pair_version: record.version,
            counterpart_profile,
        };
        let to_actor = self.fanout.persist(event_for(actor, other, other_profile));
        let to_other = self.fanout.persist(event_for(other, actor, actor_profile));

        let fanout = Arc::clone(&self.fanout);
        let _ = self.pushes.spawn(
            async move {
                let _ = fanout.push(to_other).await;
            }
            .in_current_span(),
        );
        let _ = self.fanout.push(to_actor).await;
    }

    fn connected_count(&self, user: &UserId) -> u64 {
        self.connections.count_connected(user).unwrap_or_else(|e| {
            warn!(user_id = %user, error = %e, "failed to count connections");
            0
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
