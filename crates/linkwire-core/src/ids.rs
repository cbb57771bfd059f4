//! Branded ID newtypes for type safety.
//!
//! Users, live channels and notifications each get a distinct newtype around
//! `String`, so a channel id can never be passed where a user id is expected.
//! Generated ids are UUID v7 (time-ordered). User ids come from the external
//! authentication layer and are never generated here.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    (generated $(#[$meta:meta])* $name:ident) => {
        branded_id!($(#[$meta])* $name);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id!(
    /// A member of the network, as identified by the authentication layer.
    UserId
);

branded_id!(generated
    /// One live push channel (one open tab or device).
    ChannelId
);

branded_id!(generated
    /// A persisted notification record.
    NotificationId
);

/// Canonical, order-independent identifier for an unordered pair of users.
///
/// `PairKey::new(a, b) == PairKey::new(b, a)` for every `a`, `b`. The two ids
/// are kept separately rather than joined into one string, so ids containing
/// any separator character cannot collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey {
    low: UserId,
    high: UserId,
}

impl PairKey {
    /// Build the key for `{a, b}`.
    #[must_use]
    pub fn new(a: &UserId, b: &UserId) -> Self {
        if a <= b {
            Self {
                low: a.clone(),
                high: b.clone(),
            }
        } else {
            Self {
                low: b.clone(),
                high: a.clone(),
            }
        }
    }

    /// The lexicographically smaller participant.
    #[must_use]
    pub fn low(&self) -> &UserId {
        &self.low
    }

    /// The lexicographically larger participant.
    #[must_use]
    pub fn high(&self) -> &UserId {
        &self.high
    }

    /// Whether `user` is one of the two participants.
    #[must_use]
    pub fn contains(&self, user: &UserId) -> bool {
        &self.low == user || &self.high == user
    }

    /// The participant that is not `user`, if `user` is part of the pair.
    #[must_use]
    pub fn other(&self, user: &UserId) -> Option<&UserId> {
        if &self.low == user {
            Some(&self.high)
        } else if &self.high == user {
            Some(&self.low)
        } else {
            None
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.low, self.high)
    }
}
