//! Live delivery boundary.
//!
//! [`EventFanout`](crate::fanout::EventFanout) hands serialized frames to a
//! [`LiveDelivery`] and never looks at sockets itself. The process-local
//! [`PresenceRegistry`](crate::presence::PresenceRegistry) is the default
//! implementation; a broker-backed one can replace it when running more than
//! one server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use linkwire_core::{ChannelId, UserId};
use serde::Serialize;

/// Why a push to one channel failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The socket was already gone; the channel has been unregistered.
    Closed,
    /// The channel did not accept the frame in time; it is now suspect.
    TimedOut,
}

impl FailureReason {
    /// Metric label value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::TimedOut => "timed_out",
        }
    }
}

/// One channel a push did not reach.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailure {
    /// The channel.
    pub channel_id: ChannelId,
    /// What went wrong.
    pub reason: FailureReason,
}

/// Outcome of delivering frames to every live channel of one user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    /// Channels the user had when delivery started.
    pub attempted: usize,
    /// Channels that accepted every frame.
    pub delivered: usize,
    /// Channels that did not.
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    /// Whether at least one channel received the frames.
    #[must_use]
    pub fn any_delivered(&self) -> bool {
        self.delivered > 0
    }
}

/// Pushes frames to a user's live channels.
#[async_trait]
pub trait LiveDelivery: Send + Sync {
    /// Push `frames`, in order, to every live channel of `user`, waiting at
    /// most `timeout` per frame and channel. Never fails as a whole.
    async fn deliver(
        &self,
        user: &UserId,
        frames: &[Arc<String>],
        timeout: Duration,
    ) -> DeliveryReport;
}
