//! Notification repository: the `notifications` table.

use linkwire_core::{NotificationId, UserId};
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::sqlite::row_types::{NotificationRow, to_u64};

const COLUMNS: &str = "id, recipient_id, sender_id, type, payload, pair_low, pair_high, \
                       created_at, delivered, read_at";

/// Notification repository. Stateless.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Insert a row.
    pub fn insert(conn: &Connection, row: &NotificationRow) -> Result<()> {
        let _ = conn.execute(
            &format!(
                "INSERT INTO notifications ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                row.id,
                row.recipient_id,
                row.sender_id,
                row.kind,
                row.payload,
                row.pair_low,
                row.pair_high,
                row.created_at,
                i32::from(row.delivered),
                row.read_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch one row by id.
    pub fn get(conn: &Connection, id: &NotificationId) -> Result<Option<NotificationRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM notifications WHERE id = ?1"),
                params![id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Newest-first inbox page.
    pub fn list(
        conn: &Connection,
        recipient: &UserId,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<NotificationRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM notifications
             WHERE recipient_id = ?1 AND (?2 = 0 OR read_at IS NULL)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(
                params![recipient.as_str(), i32::from(unread_only), limit],
                Self::map_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Oldest-first rows never pushed to a live channel.
    pub fn undelivered(conn: &Connection, recipient: &UserId, limit: u32) -> Result<Vec<NotificationRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM notifications
             WHERE recipient_id = ?1 AND delivered = 0
             ORDER BY created_at ASC, id ASC
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![recipient.as_str(), limit], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Set `delivered` on one row. Returns rows changed.
    pub fn mark_delivered(conn: &Connection, id: &NotificationId) -> Result<usize> {
        let changed = conn.execute(
            "UPDATE notifications SET delivered = 1 WHERE id = ?1 AND delivered = 0",
            params![id.as_str()],
        )?;
        Ok(changed)
    }

    /// Set `read_at` if unset. Returns 1 when the row exists for `recipient`,
    /// whether or not it was already read.
    pub fn mark_read(conn: &Connection, recipient: &UserId, id: &NotificationId, now: &str) -> Result<usize> {
        let changed = conn.execute(
            "UPDATE notifications SET read_at = COALESCE(read_at, ?3)
             WHERE id = ?1 AND recipient_id = ?2",
            params![id.as_str(), recipient.as_str(), now],
        )?;
        Ok(changed)
    }

    /// Mark every unread row for `recipient` as read. Returns rows changed.
    pub fn mark_all_read(conn: &Connection, recipient: &UserId, now: &str) -> Result<usize> {
        let changed = conn.execute(
            "UPDATE notifications SET read_at = ?2 WHERE recipient_id = ?1 AND read_at IS NULL",
            params![recipient.as_str(), now],
        )?;
        Ok(changed)
    }

    /// Count of unread rows for `recipient`.
    pub fn unread_count(conn: &Connection, recipient: &UserId) -> Result<u64> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND read_at IS NULL",
            params![recipient.as_str()],
            |row| row.get(0),
        )?;
        to_u64(n)
    }

    /// Count of all rows for `recipient`.
    pub fn count(conn: &Connection, recipient: &UserId) -> Result<u64> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1",
            params![recipient.as_str()],
            |row| row.get(0),
        )?;
        to_u64(n)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
        Ok(NotificationRow {
            id: row.get(0)?,
            recipient_id: row.get(1)?,
            sender_id: row.get(2)?,
            kind: row.get(3)?,
            payload: row.get(4)?,
            pair_low: row.get(5)?,
            pair_high: row.get(6)?,
            created_at: row.get(7)?,
            delivered: row.get::<_, i32>(8)? == 1,
            read_at: row.get(9)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
