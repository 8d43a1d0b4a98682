use rusqlite::{OptionalExtension, Result, Row, params};

use crate::Database;
use crate::models::AssignmentRow;

const ASSIGNMENT_COLS: &str = "id, user_id, flow_id, snapshot_id, buddy_id, assigned_by, status, \
     assigned_at, started_at, due_date, completed_at, paused_at, pause_reason, \
     completion_notes, final_score, overdue_notified, row_version";

impl Database {
    /// Insert the assignment and seed one progress row per component
    /// snapshot, in one transaction. An assignment without its progress
    /// tree never becomes visible.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_assignment_with_progress(
        &self,
        id: &str,
        user_id: &str,
        flow_id: &str,
        snapshot_id: &str,
        buddy_id: Option<&str>,
        assigned_by: &str,
        due_date: Option<&str>,
        components: &[(String, String)],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO assignments
                     (id, user_id, flow_id, snapshot_id, buddy_id, assigned_by, due_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, user_id, flow_id, snapshot_id, buddy_id, assigned_by, due_date],
            )?;

            for (component_snapshot_id, step_snapshot_id) in components {
                tx.execute(
                    "INSERT INTO component_progress
                         (assignment_id, component_snapshot_id, step_snapshot_id)
                     VALUES (?1, ?2, ?3)",
                    params![id, component_snapshot_id, step_snapshot_id],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_assignment(&self, id: &str) -> Result<Option<AssignmentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ASSIGNMENT_COLS} FROM assignments WHERE id = ?1"
            ))?;
            stmt.query_row([id], map_assignment).optional()
        })
    }

    pub fn list_assignments_for_user(&self, user_id: &str) -> Result<Vec<AssignmentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ASSIGNMENT_COLS} FROM assignments
                 WHERE user_id = ?1 ORDER BY assigned_at DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], map_assignment)?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Compare-and-swap on `row_version`: writes the row's mutable fields
    /// only if nobody updated it since it was read. False means the caller
    /// lost the race and must re-read.
    pub fn update_assignment(&self, row: &AssignmentRow) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE assignments
                 SET status = ?3, started_at = ?4, completed_at = ?5, paused_at = ?6,
                     pause_reason = ?7, completion_notes = ?8, final_score = ?9,
                     row_version = row_version + 1
                 WHERE id = ?1 AND row_version = ?2",
                params![
                    row.id,
                    row.row_version,
                    row.status,
                    row.started_at,
                    row.completed_at,
                    row.paused_at,
                    row.pause_reason,
                    row.completion_notes,
                    row.final_score
                ],
            )?;
            Ok(n > 0)
        })
    }

    /// Assignments past their due date that nobody has been told about yet.
    /// Overdue is a predicate over status + due_date, not a stored state.
    pub fn overdue_unnotified(&self, now: &str) -> Result<Vec<AssignmentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ASSIGNMENT_COLS} FROM assignments
                 WHERE status IN ('assigned', 'in_progress')
                   AND due_date IS NOT NULL AND due_date < ?1
                   AND overdue_notified = 0"
            ))?;
            let rows = stmt
                .query_map([now], map_assignment)?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn mark_overdue_notified(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE assignments SET overdue_notified = 1 WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }
}

fn map_assignment(row: &Row) -> Result<AssignmentRow> {
    Ok(AssignmentRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        flow_id: row.get(2)?,
        snapshot_id: row.get(3)?,
        buddy_id: row.get(4)?,
        assigned_by: row.get(5)?,
        status: row.get(6)?,
        assigned_at: row.get(7)?,
        started_at: row.get(8)?,
        due_date: row.get(9)?,
        completed_at: row.get(10)?,
        paused_at: row.get(11)?,
        pause_reason: row.get(12)?,
        completion_notes: row.get(13)?,
        final_score: row.get(14)?,
        overdue_notified: row.get(15)?,
        row_version: row.get(16)?,
    })
}
