//! Relationship state machine for a pairwise connection.
//!
//! [`transition`] is a pure function: given the current snapshot of a pair
//! and an action requested by one participant, it computes the next state or
//! rejects the action. It never touches storage. The caller supplies the
//! snapshot and writes the result back under optimistic concurrency.
//!
//! | current             | action by actor | next                     |
//! |---------------------|-----------------|--------------------------|
//! | NONE                | connect         | PENDING, requested by actor |
//! | PENDING (by actor)  | connect         | unchanged (no-op)        |
//! | PENDING (by other)  | connect         | CONNECTED (mutual request) |
//! | PENDING (by actor)  | cancel          | NONE                     |
//! | PENDING (by other)  | accept          | CONNECTED                |
//! | PENDING (by other)  | reject          | NONE                     |
//! | CONNECTED           | disconnect      | NONE                     |
//! | CONNECTED           | connect         | unchanged (no-op)        |
//!
//! Every other combination is an [`TransitionError::InvalidTransition`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::TransitionError;
use crate::events::ConnectionEventKind;
use crate::ids::UserId;

/// Stored status of a pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No relationship. Equivalent to an absent record.
    None,
    /// One participant asked to connect; `requested_by` says who.
    Pending,
    /// Both participants are connected.
    Connected,
}

impl ConnectionStatus {
    /// Database representation.
    #[must_use]
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Pending => "PENDING",
            Self::Connected => "CONNECTED",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(Self::None),
            "PENDING" => Some(Self::Pending),
            "CONNECTED" => Some(Self::Connected),
            _ => None,
        }
    }

    /// Lowercase wire representation (`none`, `pending`, `connected`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// A client-visible action on a pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionAction {
    /// Send a connection request (or accept one already pending from the other side).
    Connect,
    /// Withdraw one's own pending request.
    Cancel,
    /// Accept a request sent by the other participant.
    Accept,
    /// Decline a request sent by the other participant.
    Reject,
    /// Remove an established connection.
    Disconnect,
}

impl ConnectionAction {
    /// Lowercase action name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Cancel => "cancel",
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for ConnectionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a transition changes the stored state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// New state must be committed.
    Changed(ConnectionEventKind),
    /// Idempotent repeat; nothing to commit.
    NoOp,
}

/// Result of a successful transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Next status.
    pub status: ConnectionStatus,
    /// Requester when `status` is `Pending`, `None` otherwise.
    pub requested_by: Option<UserId>,
    /// Whether anything changed, and what kind of event it produces.
    pub outcome: TransitionOutcome,
}

impl Transition {
    fn changed(
        status: ConnectionStatus,
        requested_by: Option<UserId>,
        kind: ConnectionEventKind,
    ) -> Self {
        Self {
            status,
            requested_by,
            outcome: TransitionOutcome::Changed(kind),
        }
    }

    fn unchanged(status: ConnectionStatus, requested_by: Option<&UserId>) -> Self {
        Self {
            status,
            requested_by: requested_by.cloned(),
            outcome: TransitionOutcome::NoOp,
        }
    }

    /// Whether the transition must be written back.
    #[must_use]
    pub fn is_change(&self) -> bool {
        matches!(self.outcome, TransitionOutcome::Changed(_))
    }
}

/// Which participant initiated a pending request, relative to the actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Requester {
    Actor,
    Other,
}

/// Compute the next state of a pair.
///
/// `requested_by` is only consulted when `status` is `Pending`. A pending
/// snapshot whose requester is neither participant is rejected as an invalid
/// transition rather than guessed at.
pub fn transition(
    status: ConnectionStatus,
    requested_by: Option<&UserId>,
    actor: &UserId,
    other: &UserId,
    action: ConnectionAction,
) -> Result<Transition, TransitionError> {
    use ConnectionAction as A;
    use ConnectionStatus as S;

    if actor == other {
        return Err(TransitionError::SelfTarget);
    }

    let invalid = || TransitionError::InvalidTransition {
        from: status,
        action,
    };

    match status {
        S::None => match action {
            A::Connect => Ok(Transition::changed(
                S::Pending,
                Some(actor.clone()),
                ConnectionEventKind::Requested,
            )),
            _ => Err(invalid()),
        },
        S::Pending => {
            let requester = match requested_by {
                Some(r) if r == actor => Requester::Actor,
                Some(r) if r == other => Requester::Other,
                _ => return Err(invalid()),
            };
            match (requester, action) {
                (Requester::Actor, A::Connect) => Ok(Transition::unchanged(status, requested_by)),
                (Requester::Actor, A::Cancel) => Ok(Transition::changed(
                    S::None,
                    None,
                    ConnectionEventKind::Cancelled,
                )),
                (Requester::Other, A::Connect | A::Accept) => Ok(Transition::changed(
                    S::Connected,
                    None,
                    ConnectionEventKind::Accepted,
                )),
                (Requester::Other, A::Reject) => Ok(Transition::changed(
                    S::None,
                    None,
                    ConnectionEventKind::Rejected,
                )),
                _ => Err(invalid()),
            }
        }
        S::Connected => match action {
            A::Connect => Ok(Transition::unchanged(status, None)),
            A::Disconnect => Ok(Transition::changed(
                S::None,
                None,
                ConnectionEventKind::Removed,
            )),
            _ => Err(invalid()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn a() -> UserId {
        UserId::from("alice")
    }

    fn b() -> UserId {
        UserId::from("bob")
    }

    #[test]
    fn connect_from_none_makes_actor_requester() {
        let t = transition(ConnectionStatus::None, None, &a(), &b(), ConnectionAction::Connect)
            .unwrap();
        assert_eq!(t.status, ConnectionStatus::Pending);
        assert_eq!(t.requested_by, Some(a()));
        assert_eq!(
            t.outcome,
            TransitionOutcome::Changed(ConnectionEventKind::Requested)
        );
    }

    #[test]
    fn non_requester_accepts() {
        let t = transition(
            ConnectionStatus::Pending,
            Some(&a()),
            &b(),
            &a(),
            ConnectionAction::Accept,
        )
        .unwrap();
        assert_eq!(t.status, ConnectionStatus::Connected);
        assert_eq!(t.requested_by, None);
    }

    #[test]
    fn mutual_connect_is_accept() {
        let t = transition(
            ConnectionStatus::Pending,
            Some(&a()),
            &b(),
            &a(),
            ConnectionAction::Connect,
        )
        .unwrap();
        assert_eq!(t.status, ConnectionStatus::Connected);
        assert_eq!(
            t.outcome,
            TransitionOutcome::Changed(ConnectionEventKind::Accepted)
        );
    }

    #[test]
    fn repeated_connect_by_requester_is_noop() {
        let t = transition(
            ConnectionStatus::Pending,
            Some(&a()),
            &a(),
            &b(),
            ConnectionAction::Connect,
        )
        .unwrap();
        assert_eq!(t.outcome, TransitionOutcome::NoOp);
        assert_eq!(t.status, ConnectionStatus::Pending);
        assert_eq!(t.requested_by, Some(a()));
        assert!(!t.is_change());
    }

    #[test]
    fn connect_while_connected_is_noop() {
        let t = transition(
            ConnectionStatus::Connected,
            None,
            &a(),
            &b(),
            ConnectionAction::Connect,
        )
        .unwrap();
        assert_eq!(t.outcome, TransitionOutcome::NoOp);
        assert_eq!(t.status, ConnectionStatus::Connected);
    }

    #[test]
    fn requester_cancels() {
        let t = transition(
            ConnectionStatus::Pending,
            Some(&a()),
            &a(),
            &b(),
            ConnectionAction::Cancel,
        )
        .unwrap();
        assert_eq!(t.status, ConnectionStatus::None);
        assert_eq!(
            t.outcome,
            TransitionOutcome::Changed(ConnectionEventKind::Cancelled)
        );
    }

    #[test]
    fn non_requester_cannot_cancel() {
        let err = transition(
            ConnectionStatus::Pending,
            Some(&a()),
            &b(),
            &a(),
            ConnectionAction::Cancel,
        )
        .unwrap_err();
        assert_matches!(
            err,
            TransitionError::InvalidTransition {
                from: ConnectionStatus::Pending,
                action: ConnectionAction::Cancel
            }
        );
    }

    #[test]
    fn requester_cannot_accept_or_reject_own_request() {
        for action in [ConnectionAction::Accept, ConnectionAction::Reject] {
            let err = transition(ConnectionStatus::Pending, Some(&a()), &a(), &b(), action)
                .unwrap_err();
            assert_matches!(err, TransitionError::InvalidTransition { .. });
        }
    }

    #[test]
    fn non_requester_rejects() {
        let t = transition(
            ConnectionStatus::Pending,
            Some(&a()),
            &b(),
            &a(),
            ConnectionAction::Reject,
        )
        .unwrap();
        assert_eq!(t.status, ConnectionStatus::None);
        assert_eq!(
            t.outcome,
            TransitionOutcome::Changed(ConnectionEventKind::Rejected)
        );
    }

    #[test]
    fn either_side_disconnects() {
        for (actor, other) in [(a(), b()), (b(), a())] {
            let t = transition(
                ConnectionStatus::Connected,
                None,
                &actor,
                &other,
                ConnectionAction::Disconnect,
            )
            .unwrap();
            assert_eq!(t.status, ConnectionStatus::None);
        }
    }

    #[test]
    fn actions_on_none_other_than_connect_fail() {
        for action in [
            ConnectionAction::Cancel,
            ConnectionAction::Accept,
            ConnectionAction::Reject,
            ConnectionAction::Disconnect,
        ] {
            let err = transition(ConnectionStatus::None, None, &a(), &b(), action).unwrap_err();
            assert_matches!(err, TransitionError::InvalidTransition { .. });
        }
    }

    #[test]
    fn disconnect_while_pending_fails() {
        let err = transition(
            ConnectionStatus::Pending,
            Some(&b()),
            &a(),
            &b(),
            ConnectionAction::Disconnect,
        )
        .unwrap_err();
        assert_matches!(err, TransitionError::InvalidTransition { .. });
    }

    #[test]
    fn pending_with_foreign_requester_fails() {
        let stranger = UserId::from("carol");
        let err = transition(
            ConnectionStatus::Pending,
            Some(&stranger),
            &a(),
            &b(),
            ConnectionAction::Connect,
        )
        .unwrap_err();
        assert_matches!(err, TransitionError::InvalidTransition { .. });
    }

    #[test]
    fn self_target_rejected() {
        let err = transition(ConnectionStatus::None, None, &a(), &a(), ConnectionAction::Connect)
            .unwrap_err();
        assert_matches!(err, TransitionError::SelfTarget);
    }

    #[test]
    fn status_db_strings() {
        for s in [
            ConnectionStatus::None,
            ConnectionStatus::Pending,
            ConnectionStatus::Connected,
        ] {
            assert_eq!(ConnectionStatus::from_db_str(s.as_db_str()), Some(s));
        }
        assert_eq!(ConnectionStatus::from_db_str("accepted"), None);
    }

    fn action_strategy() -> impl Strategy<Value = ConnectionAction> {
        prop_oneof![
            Just(ConnectionAction::Connect),
            Just(ConnectionAction::Cancel),
            Just(ConnectionAction::Accept),
            Just(ConnectionAction::Reject),
            Just(ConnectionAction::Disconnect),
        ]
    }

    proptest! {
        /// Replaying any sequence of actions from either participant keeps the
        /// snapshot well-formed: `requested_by` is set exactly when pending
        /// and always names one of the two participants.
        #[test]
        fn snapshots_stay_well_formed(steps in prop::collection::vec((any::<bool>(), action_strategy()), 0..40)) {
            let (x, y) = (a(), b());
            let mut status = ConnectionStatus::None;
            let mut requested_by: Option<UserId> = None;
            for (by_x, action) in steps {
                let (actor, other) = if by_x { (&x, &y) } else { (&y, &x) };
                if let Ok(t) = transition(status, requested_by.as_ref(), actor, other, action) {
                    status = t.status;
                    requested_by = t.requested_by;
                }
                match status {
                    ConnectionStatus::Pending => {
                        let r = requested_by.as_ref().unwrap();
                        prop_assert!(r == &x || r == &y);
                    }
                    _ => prop_assert!(requested_by.is_none()),
                }
            }
        }

        /// A no-op never alters the snapshot.
        #[test]
        fn noop_preserves_snapshot(by_x in any::<bool>(), pending in any::<bool>()) {
            let (x, y) = (a(), b());
            let (actor, other) = if by_x { (&x, &y) } else { (&y, &x) };
            let (status, requested_by) = if pending {
                (ConnectionStatus::Pending, Some(actor.clone()))
            } else {
                (ConnectionStatus::Connected, None)
            };
            let t = transition(status, requested_by.as_ref(), actor, other, ConnectionAction::Connect).unwrap();
            prop_assert_eq!(t.outcome, TransitionOutcome::NoOp);
            prop_assert_eq!(t.status, status);
            prop_assert_eq!(t.requested_by, requested_by);
        }
    }
}
