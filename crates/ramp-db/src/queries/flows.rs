use rusqlite::{OptionalExtension, Result, Row, params};

use crate::Database;
use crate::models::{ComponentRow, FlowRow, StepRow};

const FLOW_COLS: &str =
    "id, name, description, created_by, is_active, sequential, allow_self_pause, created_at, updated_at";
const STEP_COLS: &str = "id, flow_id, title, description, rank, required, created_at";
const COMPONENT_COLS: &str = "id, step_id, title, rank, required, payload, created_at";

impl Database {
    // -- Flows --

    pub fn insert_flow(
        &self,
        id: &str,
        name: &str,
        description: &str,
        created_by: &str,
        sequential: bool,
        allow_self_pause: bool,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO flows (id, name, description, created_by, sequential, allow_self_pause)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, name, description, created_by, sequential, allow_self_pause],
            )?;
            Ok(())
        })
    }

    pub fn get_flow(&self, id: &str) -> Result<Option<FlowRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {FLOW_COLS} FROM flows WHERE id = ?1"))?;
            stmt.query_row([id], map_flow).optional()
        })
    }

    pub fn list_flows(&self, include_inactive: bool) -> Result<Vec<FlowRow>> {
        self.with_conn(|conn| {
            let sql = if include_inactive {
                format!("SELECT {FLOW_COLS} FROM flows ORDER BY created_at")
            } else {
                format!("SELECT {FLOW_COLS} FROM flows WHERE is_active = 1 ORDER BY created_at")
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], map_flow)?.collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn update_flow(
        &self,
        id: &str,
        name: &str,
        description: &str,
        sequential: bool,
        allow_self_pause: bool,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE flows
                 SET name = ?2, description = ?3, sequential = ?4, allow_self_pause = ?5,
                     updated_at = datetime('now')
                 WHERE id = ?1",
                params![id, name, description, sequential, allow_self_pause],
            )?;
            Ok(n > 0)
        })
    }

    /// Soft delete; version and snapshot history stays intact.
    pub fn deactivate_flow(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE flows SET is_active = 0, updated_at = datetime('now') WHERE id = ?1",
                [id],
            )?;
            Ok(n > 0)
        })
    }

    // -- Steps --

    pub fn insert_step(
        &self,
        id: &str,
        flow_id: &str,
        title: &str,
        description: &str,
        rank: &str,
        required: bool,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO flow_steps (id, flow_id, title, description, rank, required)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, flow_id, title, description, rank, required],
            )?;
            Ok(())
        })
    }

    pub fn get_step(&self, id: &str) -> Result<Option<StepRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {STEP_COLS} FROM flow_steps WHERE id = ?1"))?;
            stmt.query_row([id], map_step).optional()
        })
    }

    pub fn list_steps(&self, flow_id: &str) -> Result<Vec<StepRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {STEP_COLS} FROM flow_steps WHERE flow_id = ?1 ORDER BY rank"
            ))?;
            let rows = stmt
                .query_map([flow_id], map_step)?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn update_step(
        &self,
        id: &str,
        title: &str,
        description: &str,
        required: bool,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE flow_steps SET title = ?2, description = ?3, required = ?4 WHERE id = ?1",
                params![id, title, description, required],
            )?;
            Ok(n > 0)
        })
    }

    pub fn delete_step(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM flow_steps WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    /// Highest rank among a flow's steps, if it has any.
    pub fn max_step_rank(&self, flow_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT MAX(rank) FROM flow_steps WHERE flow_id = ?1",
                [flow_id],
                |row| row.get(0),
            )
        })
    }

    /// Rank of the sibling immediately after `rank`, if any.
    pub fn step_rank_after(&self, flow_id: &str, rank: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT MIN(rank) FROM flow_steps WHERE flow_id = ?1 AND rank > ?2",
                params![flow_id, rank],
                |row| row.get(0),
            )
        })
    }

    // -- Components --

    pub fn insert_component(
        &self,
        id: &str,
        step_id: &str,
        title: &str,
        rank: &str,
        required: bool,
        payload: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO components (id, step_id, title, rank, required, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, step_id, title, rank, required, payload],
            )?;
            Ok(())
        })
    }

    pub fn get_component(&self, id: &str) -> Result<Option<ComponentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COMPONENT_COLS} FROM components WHERE id = ?1"
            ))?;
            stmt.query_row([id], map_component).optional()
        })
    }

    pub fn list_components(&self, step_id: &str) -> Result<Vec<ComponentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COMPONENT_COLS} FROM components WHERE step_id = ?1 ORDER BY rank"
            ))?;
            let rows = stmt
                .query_map([step_id], map_component)?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn update_component(
        &self,
        id: &str,
        title: &str,
        required: bool,
        payload: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE components SET title = ?2, required = ?3, payload = ?4 WHERE id = ?1",
                params![id, title, required, payload],
            )?;
            Ok(n > 0)
        })
    }

    pub fn delete_component(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM components WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    pub fn max_component_rank(&self, step_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT MAX(rank) FROM components WHERE step_id = ?1",
                [step_id],
                |row| row.get(0),
            )
        })
    }

    pub fn component_rank_after(&self, step_id: &str, rank: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT MIN(rank) FROM components WHERE step_id = ?1 AND rank > ?2",
                params![step_id, rank],
                |row| row.get(0),
            )
        })
    }
}

fn map_flow(row: &Row) -> Result<FlowRow> {
    Ok(FlowRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_by: row.get(3)?,
        is_active: row.get(4)?,
        sequential: row.get(5)?,
        allow_self_pause: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn map_step(row: &Row) -> Result<StepRow> {
    Ok(StepRow {
        id: row.get(0)?,
        flow_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        rank: row.get(4)?,
        required: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_component(row: &Row) -> Result<ComponentRow> {
    Ok(ComponentRow {
        id: row.get(0)?,
        step_id: row.get(1)?,
        title: row.get(2)?,
        rank: row.get(3)?,
        required: row.get(4)?,
        payload: row.get(5)?,
        created_at: row.get(6)?,
    })
}
