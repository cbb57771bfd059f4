//! Profile lookup.
//!
//! Profiles live outside this system. The service only needs to know whether
//! a user exists and what to call them in notification messages.

use std::collections::HashMap;

use async_trait::async_trait;
use linkwire_core::{ProfileSummary, UserId};

/// Source of profile summaries.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Summary for `user`, or `None` if the user does not exist.
    async fn profile(&self, user: &UserId) -> Option<ProfileSummary>;
}

/// Directory that knows every non-empty id and names users by their id.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenDirectory;

#[async_trait]
impl ProfileDirectory for OpenDirectory {
    async fn profile(&self, user: &UserId) -> Option<ProfileSummary> {
        (!user.trim().is_empty()).then(|| ProfileSummary::bare(user))
    }
}

/// Fixed set of profiles.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    profiles: HashMap<UserId, ProfileSummary>,
}

impl StaticDirectory {
    /// Directory containing `profiles`.
    pub fn new(profiles: impl IntoIterator<Item = ProfileSummary>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|p| (p.user_id.clone(), p))
                .collect(),
        }
    }
}

#[async_trait]
impl ProfileDirectory for StaticDirectory {
    async fn profile(&self, user: &UserId) -> Option<ProfileSummary> {
        self.profiles.get(user).cloned()
    }
}
