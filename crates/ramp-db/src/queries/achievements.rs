use rusqlite::{Result, Row, params};

use crate::Database;
use crate::models::AchievementRow;

impl Database {
    /// Idempotent grant; the `(user_id, code)` unique constraint makes a
    /// repeat grant a no-op. Returns true when the row was actually new.
    pub fn grant_achievement(
        &self,
        id: &str,
        user_id: &str,
        code: &str,
        title: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO achievements (id, user_id, code, title)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, user_id, code, title],
            )?;
            Ok(n > 0)
        })
    }

    pub fn list_achievements(&self, user_id: &str) -> Result<Vec<AchievementRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, code, title, earned_at
                 FROM achievements WHERE user_id = ?1 ORDER BY earned_at",
            )?;
            let rows = stmt
                .query_map([user_id], map_achievement)?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

fn map_achievement(row: &Row) -> Result<AchievementRow> {
    Ok(AchievementRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        code: row.get(2)?,
        title: row.get(3)?,
        earned_at: row.get(4)?,
    })
}
