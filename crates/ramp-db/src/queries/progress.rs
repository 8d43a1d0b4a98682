use rusqlite::{OptionalExtension, Result, Row, params};

use crate::Database;
use crate::models::ComponentProgressRow;

const PROGRESS_COLS: &str = "assignment_id, component_snapshot_id, step_snapshot_id, is_completed, \
     attempts_count, best_score, last_score, time_spent_minutes, completed_at";

impl Database {
    pub fn get_component_progress(
        &self,
        assignment_id: &str,
        component_snapshot_id: &str,
    ) -> Result<Option<ComponentProgressRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROGRESS_COLS} FROM component_progress
                 WHERE assignment_id = ?1 AND component_snapshot_id = ?2"
            ))?;
            stmt.query_row(params![assignment_id, component_snapshot_id], map_progress)
                .optional()
        })
    }

    pub fn list_component_progress(
        &self,
        assignment_id: &str,
    ) -> Result<Vec<ComponentProgressRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROGRESS_COLS} FROM component_progress WHERE assignment_id = ?1"
            ))?;
            let rows = stmt
                .query_map([assignment_id], map_progress)?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Record one submission attempt. Every expression reads the pre-update
    /// row, so completion latches on (never off) and best_score only grows.
    pub fn record_attempt(
        &self,
        assignment_id: &str,
        component_snapshot_id: &str,
        completed: bool,
        score: i64,
        time_spent_minutes: i64,
        now: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE component_progress
                 SET attempts_count = attempts_count + 1,
                     last_score = ?3,
                     best_score = MAX(best_score, ?3),
                     time_spent_minutes = time_spent_minutes + ?4,
                     completed_at = CASE
                         WHEN is_completed = 0 AND ?5 = 1 THEN ?6
                         ELSE completed_at
                     END,
                     is_completed = MAX(is_completed, ?5)
                 WHERE assignment_id = ?1 AND component_snapshot_id = ?2",
                params![
                    assignment_id,
                    component_snapshot_id,
                    score,
                    time_spent_minutes,
                    completed,
                    now
                ],
            )?;
            Ok(n > 0)
        })
    }

    /// Sum of best scores across the assignment's components.
    pub fn total_best_score(&self, assignment_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COALESCE(SUM(best_score), 0) FROM component_progress
                 WHERE assignment_id = ?1",
                [assignment_id],
                |row| row.get(0),
            )
        })
    }
}

fn map_progress(row: &Row) -> Result<ComponentProgressRow> {
    Ok(ComponentProgressRow {
        assignment_id: row.get(0)?,
        component_snapshot_id: row.get(1)?,
        step_snapshot_id: row.get(2)?,
        is_completed: row.get(3)?,
        attempts_count: row.get(4)?,
        best_score: row.get(5)?,
        last_score: row.get(6)?,
        time_spent_minutes: row.get(7)?,
        completed_at: row.get(8)?,
    })
}
