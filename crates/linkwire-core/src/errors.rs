//! Error types for the relationship state machine.

use thiserror::Error;

use crate::state_machine::{ConnectionAction, ConnectionStatus};

/// Reasons the state machine refuses an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The action is not available from the current state for this actor.
    #[error("cannot {action} from {from}")]
    InvalidTransition {
        /// Status the pair was in.
        from: ConnectionStatus,
        /// Action that was attempted.
        action: ConnectionAction,
    },

    /// Actor and target are the same user.
    #[error("cannot act on a connection with yourself")]
    SelfTarget,
}
