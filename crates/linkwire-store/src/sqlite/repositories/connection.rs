//! Connection repository: the `connections` table.

use linkwire_core::{ConnectionStatus, PairKey, UserId};
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::sqlite::row_types::{ConnectionRow, to_u64};

const COLUMNS: &str = "participant_low, participant_high, status, requested_by, \
                       created_at, updated_at, version";

/// Connection repository. Stateless.
pub struct ConnectionRepo;

impl ConnectionRepo {
    /// Fetch the row for a pair.
    pub fn get(conn: &Connection, pair: &PairKey) -> Result<Option<ConnectionRow>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM connections
                     WHERE participant_low = ?1 AND participant_high = ?2"
                ),
                params![pair.low().as_str(), pair.high().as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Insert unless a row for the pair exists. Returns rows written (0 or 1).
    pub fn insert_if_absent(conn: &Connection, row: &ConnectionRow) -> Result<usize> {
        let changed = conn.execute(
            &format!(
                "INSERT INTO connections ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (participant_low, participant_high) DO NOTHING"
            ),
            params![
                row.participant_low,
                row.participant_high,
                row.status,
                row.requested_by,
                row.created_at,
                row.updated_at,
                row.version,
            ],
        )?;
        Ok(changed)
    }

    /// Overwrite the row only if its version is still `expected`. Returns rows
    /// written (0 or 1).
    pub fn update_if_version(conn: &Connection, row: &ConnectionRow, expected: i64) -> Result<usize> {
        let changed = conn.execute(
            "UPDATE connections
             SET status = ?3, requested_by = ?4, updated_at = ?5, version = ?6
             WHERE participant_low = ?1 AND participant_high = ?2 AND version = ?7",
            params![
                row.participant_low,
                row.participant_high,
                row.status,
                row.requested_by,
                row.updated_at,
                row.version,
                expected,
            ],
        )?;
        Ok(changed)
    }

    /// Every row involving `user` with the given status.
    pub fn list_for_user(
        conn: &Connection,
        user: &UserId,
        status: ConnectionStatus,
    ) -> Result<Vec<ConnectionRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM connections
             WHERE (participant_low = ?1 OR participant_high = ?1) AND status = ?2
             ORDER BY updated_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![user.as_str(), status.as_db_str()], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Number of rows involving `user` with the given status.
    pub fn count_for_user(conn: &Connection, user: &UserId, status: ConnectionStatus) -> Result<u64> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM connections
             WHERE (participant_low = ?1 OR participant_high = ?1) AND status = ?2",
            params![user.as_str(), status.as_db_str()],
            |row| row.get(0),
        )?;
        to_u64(n)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConnectionRow> {
        Ok(ConnectionRow {
            participant_low: row.get(0)?,
            participant_high: row.get(1)?,
            status: row.get(2)?,
            requested_by: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            version: row.get(6)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
