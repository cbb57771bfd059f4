//! Storage traits used by the service layer.
//!
//! Both traits are synchronous: every call is a short `SQLite` statement, and
//! callers never hold a record across an await point.

mod sqlite_store;

pub use sqlite_store::SqliteStore;

use linkwire_core::{ConnectionRecord, ConnectionStatus, NotificationId, PairKey, UserId};

use crate::errors::Result;
use crate::types::{NotificationQuery, NotificationRecord};

/// Versioned storage of connection records.
pub trait ConnectionStore: Send + Sync {
    /// Current record for a pair, tombstones included.
    fn get(&self, pair: &PairKey) -> Result<Option<ConnectionRecord>>;

    /// Write `record` only if the stored version is still `expected_version`
    /// (`None` means no record may exist yet). Returns the committed version.
    ///
    /// A mismatch yields [`StoreError::VersionConflict`](crate::StoreError::VersionConflict)
    /// and leaves the stored record untouched. `record.version` must be
    /// `expected_version + 1`, or `1` for a first write; anything else is
    /// [`StoreError::InvalidRecord`](crate::StoreError::InvalidRecord).
    fn compare_and_swap(
        &self,
        pair: &PairKey,
        expected_version: Option<u64>,
        record: &ConnectionRecord,
    ) -> Result<u64>;

    /// Records involving `user` in the given status, most recently updated first.
    fn list_for_user(&self, user: &UserId, status: ConnectionStatus) -> Result<Vec<ConnectionRecord>>;

    /// Number of users `user` is connected with.
    fn count_connected(&self, user: &UserId) -> Result<u64>;
}

/// Durable notification inbox.
pub trait NotificationStore: Send + Sync {
    /// Persist a new notification.
    fn append(&self, record: &NotificationRecord) -> Result<()>;

    /// Flag notifications as delivered. Returns how many changed.
    fn mark_delivered(&self, ids: &[NotificationId]) -> Result<usize>;

    /// Oldest-first notifications not yet delivered to any live channel.
    fn undelivered(&self, recipient: &UserId, limit: u32) -> Result<Vec<NotificationRecord>>;

    /// Newest-first inbox page.
    fn list(&self, recipient: &UserId, query: &NotificationQuery) -> Result<Vec<NotificationRecord>>;

    /// Unread notifications for `recipient`.
    fn unread_count(&self, recipient: &UserId) -> Result<u64>;

    /// Mark one notification read. `false` if it does not exist for `recipient`.
    fn mark_read(&self, recipient: &UserId, id: &NotificationId) -> Result<bool>;

    /// Mark the whole inbox read. Returns how many changed.
    fn mark_all_read(&self, recipient: &UserId) -> Result<usize>;
}
