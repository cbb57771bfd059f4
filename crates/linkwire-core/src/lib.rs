//! # linkwire-core
//!
//! Foundation types shared by every linkwire crate:
//!
//! - **Ids**: branded newtypes for users, live channels and notifications,
//!   plus the order-independent [`PairKey`]
//! - **State machine**: the pure [`transition`] function governing a pairwise
//!   connection
//! - **Records and views**: [`ConnectionRecord`] and the per-viewer
//!   [`ViewerStatus`]
//! - **Events**: [`ConnectionEvent`] describing a committed change from one
//!   participant's point of view
//! - **Errors and logging**: [`TransitionError`] and the `tracing` subscriber
//!   setup

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod record;
pub mod state_machine;
pub mod view;

pub use errors::TransitionError;
pub use events::{ConnectionEvent, ConnectionEventKind, NotificationKind, ProfileSummary};
pub use ids::{ChannelId, NotificationId, PairKey, UserId};
pub use record::ConnectionRecord;
pub use state_machine::{
    ConnectionAction, ConnectionStatus, Transition, TransitionOutcome, transition,
};
pub use view::ViewerStatus;
