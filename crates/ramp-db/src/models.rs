//! Database row types, mapping directly to SQLite rows. Distinct from the
//! ramp-types domain models to keep the DB layer independent; timestamps
//! stay as the TEXT SQLite hands back.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub role: String,
    pub created_at: String,
}

pub struct FlowRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub is_active: bool,
    pub sequential: bool,
    pub allow_self_pause: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub struct StepRow {
    pub id: String,
    pub flow_id: String,
    pub title: String,
    pub description: String,
    pub rank: String,
    pub required: bool,
    pub created_at: String,
}

pub struct ComponentRow {
    pub id: String,
    pub step_id: String,
    pub title: String,
    pub rank: String,
    pub required: bool,
    pub payload: String,
    pub created_at: String,
}

pub struct VersionRow {
    pub id: String,
    pub original_id: String,
    pub version: i64,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub struct SnapshotRow {
    pub id: String,
    pub original_flow_id: String,
    pub version: i64,
    pub flow_version: Option<i64>,
    pub name: String,
    pub description: String,
    pub sequential: bool,
    pub allow_self_pause: bool,
    pub created_at: String,
}

pub struct StepSnapshotRow {
    pub id: String,
    pub snapshot_id: String,
    pub original_step_id: String,
    pub title: String,
    pub description: String,
    pub rank: String,
    pub required: bool,
}

pub struct ComponentSnapshotRow {
    pub id: String,
    pub step_snapshot_id: String,
    pub original_component_id: String,
    pub title: String,
    pub rank: String,
    pub required: bool,
    pub payload: String,
}

pub struct AssignmentRow {
    pub id: String,
    pub user_id: String,
    pub flow_id: String,
    pub snapshot_id: String,
    pub buddy_id: Option<String>,
    pub assigned_by: String,
    pub status: String,
    pub assigned_at: String,
    pub started_at: Option<String>,
    pub due_date: Option<String>,
    pub completed_at: Option<String>,
    pub paused_at: Option<String>,
    pub pause_reason: Option<String>,
    pub completion_notes: Option<String>,
    pub final_score: Option<i64>,
    pub overdue_notified: bool,
    pub row_version: i64,
}

pub struct ComponentProgressRow {
    pub assignment_id: String,
    pub component_snapshot_id: String,
    pub step_snapshot_id: String,
    pub is_completed: bool,
    pub attempts_count: i64,
    pub best_score: i64,
    pub last_score: i64,
    pub time_spent_minutes: i64,
    pub completed_at: Option<String>,
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub message: String,
    pub assignment_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

pub struct AchievementRow {
    pub id: String,
    pub user_id: String,
    pub code: String,
    pub title: String,
    pub earned_at: String,
}

/// Parse a timestamp as SQLite stores it. `datetime('now')` writes
/// "YYYY-MM-DD HH:MM:SS" without a timezone (it is UTC); timestamps we
/// write ourselves are RFC 3339. Accept both.
pub fn parse_ts(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", s, e);
            DateTime::default()
        })
}

pub fn parse_ts_opt(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.map(parse_ts)
}

/// Format a timestamp the same way `datetime('now')` does, so SQL string
/// comparisons between the two stay meaningful.
pub fn format_ts(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}
