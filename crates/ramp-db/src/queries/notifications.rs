use rusqlite::{Result, Row, params};

use crate::Database;
use crate::models::NotificationRow;

impl Database {
    pub fn insert_notification(
        &self,
        id: &str,
        user_id: &str,
        kind: &str,
        message: &str,
        assignment_id: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, kind, message, assignment_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, user_id, kind, message, assignment_id],
            )?;
            Ok(())
        })
    }

    pub fn list_notifications(&self, user_id: &str) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, message, assignment_id, is_read, created_at
                 FROM notifications WHERE user_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_notification)?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Scoped to the owner so users cannot mark each other's reads.
    pub fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(n > 0)
        })
    }
}

fn map_notification(row: &Row) -> Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        message: row.get(3)?,
        assignment_id: row.get(4)?,
        is_read: row.get(5)?,
        created_at: row.get(6)?,
    })
}
