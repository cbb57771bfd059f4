//! Service error type.

use linkwire_core::{ConnectionAction, ConnectionStatus, TransitionError, UserId};
use linkwire_store::StoreError;

/// `error` value for malformed input and self-targeting.
pub const INVALID_REQUEST: &str = "InvalidRequest";
/// `error` value for unknown users and notifications.
pub const NOT_FOUND: &str = "NotFound";
/// `error` value for actions not allowed from the current state.
pub const INVALID_ACTION: &str = "InvalidAction";
/// `error` value when concurrent writers kept winning.
pub const CONTENTION: &str = "Contention";
/// `error` value for a missing caller identity.
pub const UNAUTHORIZED: &str = "Unauthorized";
/// `error` value for everything else.
pub const INTERNAL: &str = "Internal";

/// Errors returned by [`ConnectionService`](crate::service::ConnectionService)
/// and the read endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The target is the actor, or the input is malformed.
    #[error("{message}")]
    InvalidTarget {
        /// What is wrong.
        message: String,
    },

    /// The profile directory does not know the user.
    #[error("user {user_id} not found")]
    NotFound {
        /// The unknown user.
        user_id: UserId,
    },

    /// The action is not available from the pair's current state.
    #[error("cannot {action} a connection that is {}", .from.as_str())]
    InvalidAction {
        /// State the pair was in.
        from: ConnectionStatus,
        /// Rejected action.
        action: ConnectionAction,
    },

    /// Every compare-and-swap attempt lost to a concurrent writer.
    #[error("connection changed concurrently, gave up after {attempts} attempts")]
    Contention {
        /// Attempts made.
        attempts: u32,
    },

    /// Storage failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Machine-readable code sent as `error` in HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTarget { .. } => INVALID_REQUEST,
            Self::NotFound { .. } => NOT_FOUND,
            Self::InvalidAction { .. } => INVALID_ACTION,
            Self::Contention { .. } => CONTENTION,
            Self::Store(_) => INTERNAL,
        }
    }
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidTransition { from, action } => Self::InvalidAction { from, action },
            TransitionError::SelfTarget => Self::InvalidTarget {
                message: TransitionError::SelfTarget.to_string(),
            },
        }
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;
