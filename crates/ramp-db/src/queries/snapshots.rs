use rusqlite::{OptionalExtension, Result, Row, params};
use uuid::Uuid;

use crate::Database;
use crate::models::{ComponentSnapshotRow, SnapshotRow, StepSnapshotRow};

const SNAPSHOT_COLS: &str = "id, original_flow_id, version, flow_version, name, description, sequential, allow_self_pause, created_at";

impl Database {
    /// Deep-copy a flow's live structure into snapshot rows. The read and
    /// every write share one transaction, so a concurrent edit cannot
    /// produce a torn copy. Returns the snapshot's version number, or None
    /// when the flow does not exist or is soft-deleted.
    pub fn create_snapshot(&self, flow_id: &str, snapshot_id: &str) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let flow: Option<(String, String, bool, bool)> = tx
                .query_row(
                    "SELECT name, description, sequential, allow_self_pause
                     FROM flows WHERE id = ?1 AND is_active = 1",
                    [flow_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;
            let (name, description, sequential, allow_self_pause) = match flow {
                Some(f) => f,
                None => return Ok(None),
            };

            let flow_version: Option<i64> = tx
                .query_row(
                    "SELECT version FROM flow_versions WHERE original_id = ?1 AND is_active = 1",
                    [flow_id],
                    |row| row.get(0),
                )
                .optional()?;

            let snap_version: i64 = tx.query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM flow_snapshots
                 WHERE original_flow_id = ?1",
                [flow_id],
                |row| row.get(0),
            )?;

            tx.execute(
                "INSERT INTO flow_snapshots
                     (id, original_flow_id, version, flow_version, name, description,
                      sequential, allow_self_pause)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    snapshot_id,
                    flow_id,
                    snap_version,
                    flow_version,
                    name,
                    description,
                    sequential,
                    allow_self_pause
                ],
            )?;

            let steps: Vec<(String, String, String, String, bool)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, title, description, rank, required
                     FROM flow_steps WHERE flow_id = ?1 ORDER BY rank",
                )?;
                let rows = stmt
                    .query_map([flow_id], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>>>()?;
                rows
            };

            for (step_id, title, description, rank, required) in steps {
                let step_snap_id = Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO step_snapshots
                         (id, snapshot_id, original_step_id, title, description, rank, required)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![step_snap_id, snapshot_id, step_id, title, description, rank, required],
                )?;

                let components: Vec<(String, String, String, bool, String)> = {
                    let mut stmt = tx.prepare(
                        "SELECT id, title, rank, required, payload
                         FROM components WHERE step_id = ?1 ORDER BY rank",
                    )?;
                    let rows = stmt
                        .query_map([&step_id], |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                            ))
                        })?
                        .collect::<Result<Vec<_>>>()?;
                    rows
                };

                for (component_id, title, rank, required, payload) in components {
                    tx.execute(
                        "INSERT INTO component_snapshots
                             (id, step_snapshot_id, original_component_id, title, rank,
                              required, payload)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            Uuid::new_v4().to_string(),
                            step_snap_id,
                            component_id,
                            title,
                            rank,
                            required,
                            payload
                        ],
                    )?;
                }
            }

            tx.commit()?;
            Ok(Some(snap_version))
        })
    }

    pub fn get_snapshot(&self, id: &str) -> Result<Option<SnapshotRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SNAPSHOT_COLS} FROM flow_snapshots WHERE id = ?1"
            ))?;
            stmt.query_row([id], map_snapshot).optional()
        })
    }

    pub fn get_latest_snapshot(&self, original_flow_id: &str) -> Result<Option<SnapshotRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SNAPSHOT_COLS} FROM flow_snapshots
                 WHERE original_flow_id = ?1 ORDER BY version DESC LIMIT 1"
            ))?;
            stmt.query_row([original_flow_id], map_snapshot).optional()
        })
    }

    pub fn get_snapshot_by_version(
        &self,
        original_flow_id: &str,
        version: i64,
    ) -> Result<Option<SnapshotRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SNAPSHOT_COLS} FROM flow_snapshots
                 WHERE original_flow_id = ?1 AND version = ?2"
            ))?;
            stmt.query_row(params![original_flow_id, version], map_snapshot)
                .optional()
        })
    }

    pub fn get_snapshot_steps(&self, snapshot_id: &str) -> Result<Vec<StepSnapshotRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, snapshot_id, original_step_id, title, description, rank, required
                 FROM step_snapshots WHERE snapshot_id = ?1 ORDER BY rank",
            )?;
            let rows = stmt
                .query_map([snapshot_id], |row| {
                    Ok(StepSnapshotRow {
                        id: row.get(0)?,
                        snapshot_id: row.get(1)?,
                        original_step_id: row.get(2)?,
                        title: row.get(3)?,
                        description: row.get(4)?,
                        rank: row.get(5)?,
                        required: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// All component snapshots of a snapshot, ordered by step rank then
    /// component rank (one JOIN, no N+1).
    pub fn get_snapshot_components(&self, snapshot_id: &str) -> Result<Vec<ComponentSnapshotRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.step_snapshot_id, c.original_component_id, c.title, c.rank,
                        c.required, c.payload
                 FROM component_snapshots c
                 JOIN step_snapshots s ON c.step_snapshot_id = s.id
                 WHERE s.snapshot_id = ?1
                 ORDER BY s.rank, c.rank",
            )?;
            let rows = stmt
                .query_map([snapshot_id], |row| {
                    Ok(ComponentSnapshotRow {
                        id: row.get(0)?,
                        step_snapshot_id: row.get(1)?,
                        original_component_id: row.get(2)?,
                        title: row.get(3)?,
                        rank: row.get(4)?,
                        required: row.get(5)?,
                        payload: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn get_component_snapshot(&self, id: &str) -> Result<Option<ComponentSnapshotRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, step_snapshot_id, original_component_id, title, rank, required, payload
                 FROM component_snapshots WHERE id = ?1",
            )?;
            stmt.query_row([id], |row| {
                Ok(ComponentSnapshotRow {
                    id: row.get(0)?,
                    step_snapshot_id: row.get(1)?,
                    original_component_id: row.get(2)?,
                    title: row.get(3)?,
                    rank: row.get(4)?,
                    required: row.get(5)?,
                    payload: row.get(6)?,
                })
            })
            .optional()
        })
    }

    /// Snapshots created before `cutoff`, oldest first. GC candidates only;
    /// the caller still has to clear them against live assignments.
    pub fn get_old_snapshots(&self, cutoff: &str) -> Result<Vec<SnapshotRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SNAPSHOT_COLS} FROM flow_snapshots
                 WHERE created_at < ?1 ORDER BY created_at"
            ))?;
            let rows = stmt
                .query_map([cutoff], map_snapshot)?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// True while any non-completed assignment still points at the snapshot.
    pub fn has_active_assignments(&self, snapshot_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS (
                     SELECT 1 FROM assignments
                     WHERE snapshot_id = ?1 AND status != 'completed'
                 )",
                [snapshot_id],
                |row| row.get(0),
            )
        })
    }

    pub fn snapshot_ids_for_version(
        &self,
        original_flow_id: &str,
        flow_version: i64,
    ) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM flow_snapshots
                 WHERE original_flow_id = ?1 AND flow_version = ?2",
            )?;
            let rows = stmt
                .query_map(params![original_flow_id, flow_version], |row| row.get(0))?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch assignment ids referencing any of the given snapshots.
    pub fn assignment_ids_for_snapshots(&self, snapshot_ids: &[String]) -> Result<Vec<String>> {
        if snapshot_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=snapshot_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id FROM assignments WHERE snapshot_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let bind: Vec<&dyn rusqlite::types::ToSql> = snapshot_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();
            let rows = stmt
                .query_map(bind.as_slice(), |row| row.get(0))?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Step and component rows go with it via ON DELETE CASCADE.
    pub fn delete_snapshot(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM flow_snapshots WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }
}

fn map_snapshot(row: &Row) -> Result<SnapshotRow> {
    Ok(SnapshotRow {
        id: row.get(0)?,
        original_flow_id: row.get(1)?,
        version: row.get(2)?,
        flow_version: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
        sequential: row.get(6)?,
        allow_self_pause: row.get(7)?,
        created_at: row.get(8)?,
    })
}
