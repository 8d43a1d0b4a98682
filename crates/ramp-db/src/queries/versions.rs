use rusqlite::{OptionalExtension, Result, Row, params};

use crate::Database;
use crate::models::VersionRow;

const VERSION_COLS: &str =
    "id, original_id, version, name, description, is_active, created_at, updated_at";

/// Result of an activation attempt, decided inside the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    Activated,
    /// Target was already the active version; nothing was written.
    AlreadyActive,
    NotFound,
}

impl Database {
    /// Allocate the next version number for `original_id` and insert the
    /// publication row, inactive. Allocation and insert share a transaction
    /// so concurrent publishes cannot reuse a number.
    pub fn create_version(
        &self,
        id: &str,
        original_id: &str,
        name: &str,
        description: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM flow_versions WHERE original_id = ?1",
                [original_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO flow_versions (id, original_id, version, name, description)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, original_id, next, name, description],
            )?;
            tx.commit()?;
            Ok(next)
        })
    }

    /// Deactivate-all then activate-one, atomically. Re-activating the
    /// already-active version touches nothing, not even `updated_at`.
    pub fn activate_version(&self, id: &str) -> Result<ActivationOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let target: Option<(String, bool)> = tx
                .query_row(
                    "SELECT original_id, is_active FROM flow_versions WHERE id = ?1",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let (original_id, is_active) = match target {
                Some(t) => t,
                None => return Ok(ActivationOutcome::NotFound),
            };
            if is_active {
                return Ok(ActivationOutcome::AlreadyActive);
            }

            tx.execute(
                "UPDATE flow_versions SET is_active = 0, updated_at = datetime('now')
                 WHERE original_id = ?1 AND is_active = 1",
                [&original_id],
            )?;
            tx.execute(
                "UPDATE flow_versions SET is_active = 1, updated_at = datetime('now')
                 WHERE id = ?1",
                [id],
            )?;

            tx.commit()?;
            Ok(ActivationOutcome::Activated)
        })
    }

    /// Leaving an entity with zero active versions is legal (an unpublished
    /// draft); returns how many rows were deactivated.
    pub fn deactivate_versions(&self, original_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE flow_versions SET is_active = 0, updated_at = datetime('now')
                 WHERE original_id = ?1 AND is_active = 1",
                [original_id],
            )
        })
    }

    pub fn get_version(&self, id: &str) -> Result<Option<VersionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VERSION_COLS} FROM flow_versions WHERE id = ?1"
            ))?;
            stmt.query_row([id], map_version).optional()
        })
    }

    pub fn get_active_version(&self, original_id: &str) -> Result<Option<VersionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VERSION_COLS} FROM flow_versions WHERE original_id = ?1 AND is_active = 1"
            ))?;
            stmt.query_row([original_id], map_version).optional()
        })
    }

    pub fn list_versions(&self, original_id: &str) -> Result<Vec<VersionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VERSION_COLS} FROM flow_versions WHERE original_id = ?1 ORDER BY version"
            ))?;
            let rows = stmt
                .query_map([original_id], map_version)?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn max_version(&self, original_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COALESCE(MAX(version), 0) FROM flow_versions WHERE original_id = ?1",
                [original_id],
                |row| row.get(0),
            )
        })
    }

    pub fn delete_version(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM flow_versions WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }
}

fn map_version(row: &Row) -> Result<VersionRow> {
    Ok(VersionRow {
        id: row.get(0)?,
        original_id: row.get(1)?,
        version: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
