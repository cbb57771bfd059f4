//! [`ConnectionStore`] and [`NotificationStore`] over an `r2d2` `SQLite` pool.

use std::path::Path;

use chrono::Utc;
use linkwire_core::{ConnectionRecord, ConnectionStatus, NotificationId, PairKey, UserId};
use tracing::debug;

use super::{ConnectionStore, NotificationStore};
use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::{ConnectionRepo, NotificationRepo};
use crate::sqlite::row_types::{ConnectionRow, NotificationRow, format_ts, to_i64};
use crate::types::{NotificationQuery, NotificationRecord};

/// Pool-backed store. Cheap to clone.
#[derive(Clone)]
pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    /// Wrap an existing pool. Migrations must already be applied.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Private in-memory database with migrations applied.
    pub fn in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        Self::migrated(pool)
    }

    /// File-backed database with migrations applied.
    pub fn open(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        Self::migrated(pool)
    }

    fn migrated(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self::new(pool))
    }

    /// Underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }
}

impl ConnectionStore for SqliteStore {
    fn get(&self, pair: &PairKey) -> Result<Option<ConnectionRecord>> {
        let conn = self.conn()?;
        ConnectionRepo::get(&conn, pair)?
            .map(ConnectionRow::into_record)
            .transpose()
    }

    fn compare_and_swap(
        &self,
        pair: &PairKey,
        expected_version: Option<u64>,
        record: &ConnectionRecord,
    ) -> Result<u64> {
        if &record.pair != pair {
            return Err(StoreError::InvalidRecord(format!(
                "record for {} written under {pair}",
                record.pair
            )));
        }
        let next_version = expected_version.map_or(1, |v| v + 1);
        if record.version != next_version {
            return Err(StoreError::InvalidRecord(format!(
                "record version {} after {expected_version:?}, expected {next_version}",
                record.version
            )));
        }
        let row = ConnectionRow::from_record(record)?;
        let conn = self.conn()?;

        let written = match expected_version {
            None => ConnectionRepo::insert_if_absent(&conn, &row)?,
            Some(expected) => ConnectionRepo::update_if_version(&conn, &row, to_i64(expected)?)?,
        };

        if written == 0 {
            debug!(%pair, ?expected_version, "compare-and-swap lost");
            return Err(StoreError::VersionConflict {
                pair: pair.clone(),
                expected: expected_version,
            });
        }
        Ok(record.version)
    }

    fn list_for_user(&self, user: &UserId, status: ConnectionStatus) -> Result<Vec<ConnectionRecord>> {
        let conn = self.conn()?;
        ConnectionRepo::list_for_user(&conn, user, status)?
            .into_iter()
            .map(ConnectionRow::into_record)
            .collect()
    }

    fn count_connected(&self, user: &UserId) -> Result<u64> {
        let conn = self.conn()?;
        ConnectionRepo::count_for_user(&conn, user, ConnectionStatus::Connected)
    }
}

impl NotificationStore for SqliteStore {
    fn append(&self, record: &NotificationRecord) -> Result<()> {
        let row = NotificationRow::from_record(record)?;
        let conn = self.conn()?;
        NotificationRepo::insert(&conn, &row)
    }

    fn mark_delivered(&self, ids: &[NotificationId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut changed = 0;
        for id in ids {
            changed += NotificationRepo::mark_delivered(&tx, id)?;
        }
        tx.commit()?;
        Ok(changed)
    }

    fn undelivered(&self, recipient: &UserId, limit: u32) -> Result<Vec<NotificationRecord>> {
        let conn = self.conn()?;
        NotificationRepo::undelivered(&conn, recipient, limit)?
            .into_iter()
            .map(NotificationRow::into_record)
            .collect()
    }

    fn list(&self, recipient: &UserId, query: &NotificationQuery) -> Result<Vec<NotificationRecord>> {
        let conn = self.conn()?;
        NotificationRepo::list(&conn, recipient, query.unread_only, query.limit)?
            .into_iter()
            .map(NotificationRow::into_record)
            .collect()
    }

    fn unread_count(&self, recipient: &UserId) -> Result<u64> {
        let conn = self.conn()?;
        NotificationRepo::unread_count(&conn, recipient)
    }

    fn mark_read(&self, recipient: &UserId, id: &NotificationId) -> Result<bool> {
        let conn = self.conn()?;
        let now = format_ts(Utc::now());
        Ok(NotificationRepo::mark_read(&conn, recipient, id, &now)? > 0)
    }

    fn mark_all_read(&self, recipient: &UserId) -> Result<usize> {
        let conn = self.conn()?;
        let now = format_ts(Utc::now());
        NotificationRepo::mark_all_read(&conn, recipient, &now)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
