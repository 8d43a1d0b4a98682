//! Row-to-domain conversions. Rows keep SQLite's string spellings; the
//! domain types carry parsed uuids, timestamps, ranks and payloads.

use ramp_db::models::{
    AchievementRow, AssignmentRow, ComponentRow, ComponentSnapshotRow, FlowRow, NotificationRow,
    SnapshotRow, StepRow, StepSnapshotRow, UserRow, VersionRow, parse_ts, parse_ts_opt,
};
use ramp_types::models::{
    Achievement, AssignmentStatus, Component, ComponentPayload, ComponentSnapshot, Flow,
    FlowAssignment, FlowSettings, FlowSnapshot, FlowStep, FlowVersion, Notification,
    NotificationKind, Role, StepSnapshot, User,
};
use ramp_types::order::OrderKey;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

pub(crate) fn parse_id(s: &str) -> CoreResult<Uuid> {
    s.parse()
        .map_err(|_| CoreError::Corrupt(format!("bad uuid '{s}'")))
}

fn parse_id_opt(s: Option<&str>) -> CoreResult<Option<Uuid>> {
    s.map(parse_id).transpose()
}

fn parse_rank(s: &str) -> CoreResult<OrderKey> {
    OrderKey::parse(s).map_err(|e| CoreError::Corrupt(e.to_string()))
}

pub(crate) fn parse_payload(s: &str) -> CoreResult<ComponentPayload> {
    serde_json::from_str(s).map_err(|e| CoreError::Corrupt(format!("bad component payload: {e}")))
}

fn parse_status(s: &str) -> CoreResult<AssignmentStatus> {
    AssignmentStatus::parse(s)
        .ok_or_else(|| CoreError::Corrupt(format!("bad assignment status '{s}'")))
}

pub(crate) fn user_from_row(row: UserRow) -> CoreResult<User> {
    Ok(User {
        id: parse_id(&row.id)?,
        role: Role::parse(&row.role)
            .ok_or_else(|| CoreError::Corrupt(format!("bad role '{}'", row.role)))?,
        username: row.username,
        display_name: row.display_name,
        created_at: parse_ts(&row.created_at),
    })
}

pub(crate) fn flow_from_row(row: FlowRow) -> CoreResult<Flow> {
    Ok(Flow {
        id: parse_id(&row.id)?,
        created_by: parse_id(&row.created_by)?,
        name: row.name,
        description: row.description,
        is_active: row.is_active,
        settings: FlowSettings {
            sequential: row.sequential,
            allow_self_pause: row.allow_self_pause,
        },
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    })
}

pub(crate) fn step_from_row(row: StepRow) -> CoreResult<FlowStep> {
    Ok(FlowStep {
        id: parse_id(&row.id)?,
        flow_id: parse_id(&row.flow_id)?,
        rank: parse_rank(&row.rank)?,
        title: row.title,
        description: row.description,
        required: row.required,
        created_at: parse_ts(&row.created_at),
    })
}

pub(crate) fn component_from_row(row: ComponentRow) -> CoreResult<Component> {
    Ok(Component {
        id: parse_id(&row.id)?,
        step_id: parse_id(&row.step_id)?,
        rank: parse_rank(&row.rank)?,
        payload: parse_payload(&row.payload)?,
        title: row.title,
        required: row.required,
        created_at: parse_ts(&row.created_at),
    })
}

pub(crate) fn version_from_row(row: VersionRow) -> CoreResult<FlowVersion> {
    Ok(FlowVersion {
        id: parse_id(&row.id)?,
        original_id: parse_id(&row.original_id)?,
        version: row.version,
        name: row.name,
        description: row.description,
        is_active: row.is_active,
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    })
}

/// Assemble a full snapshot aggregate from its three row sets.
pub(crate) fn snapshot_from_rows(
    row: SnapshotRow,
    step_rows: Vec<StepSnapshotRow>,
    component_rows: Vec<ComponentSnapshotRow>,
) -> CoreResult<FlowSnapshot> {
    let mut steps = Vec::with_capacity(step_rows.len());
    for step_row in step_rows {
        let components = component_rows
            .iter()
            .filter(|c| c.step_snapshot_id == step_row.id)
            .map(|c| {
                Ok(ComponentSnapshot {
                    id: parse_id(&c.id)?,
                    original_component_id: parse_id(&c.original_component_id)?,
                    title: c.title.clone(),
                    rank: parse_rank(&c.rank)?,
                    required: c.required,
                    payload: parse_payload(&c.payload)?,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        steps.push(StepSnapshot {
            id: parse_id(&step_row.id)?,
            original_step_id: parse_id(&step_row.original_step_id)?,
            title: step_row.title,
            description: step_row.description,
            rank: parse_rank(&step_row.rank)?,
            required: step_row.required,
            components,
        });
    }

    Ok(FlowSnapshot {
        id: parse_id(&row.id)?,
        original_flow_id: parse_id(&row.original_flow_id)?,
        version: row.version,
        flow_version: row.flow_version,
        name: row.name,
        description: row.description,
        settings: FlowSettings {
            sequential: row.sequential,
            allow_self_pause: row.allow_self_pause,
        },
        created_at: parse_ts(&row.created_at),
        steps,
    })
}

pub(crate) fn assignment_from_row(row: AssignmentRow) -> CoreResult<FlowAssignment> {
    Ok(FlowAssignment {
        id: parse_id(&row.id)?,
        user_id: parse_id(&row.user_id)?,
        flow_id: parse_id(&row.flow_id)?,
        snapshot_id: parse_id(&row.snapshot_id)?,
        buddy_id: parse_id_opt(row.buddy_id.as_deref())?,
        assigned_by: parse_id(&row.assigned_by)?,
        status: parse_status(&row.status)?,
        assigned_at: parse_ts(&row.assigned_at),
        started_at: parse_ts_opt(row.started_at.as_deref()),
        due_date: parse_ts_opt(row.due_date.as_deref()),
        completed_at: parse_ts_opt(row.completed_at.as_deref()),
        paused_at: parse_ts_opt(row.paused_at.as_deref()),
        pause_reason: row.pause_reason,
        completion_notes: row.completion_notes,
        final_score: row.final_score,
        row_version: row.row_version,
    })
}

pub(crate) fn notification_from_row(row: NotificationRow) -> CoreResult<Notification> {
    Ok(Notification {
        id: parse_id(&row.id)?,
        user_id: parse_id(&row.user_id)?,
        kind: NotificationKind::parse(&row.kind)
            .ok_or_else(|| CoreError::Corrupt(format!("bad notification kind '{}'", row.kind)))?,
        message: row.message,
        assignment_id: parse_id_opt(row.assignment_id.as_deref())?,
        is_read: row.is_read,
        created_at: parse_ts(&row.created_at),
    })
}

pub(crate) fn achievement_from_row(row: AchievementRow) -> CoreResult<Achievement> {
    Ok(Achievement {
        id: parse_id(&row.id)?,
        user_id: parse_id(&row.user_id)?,
        code: row.code,
        title: row.title,
        earned_at: parse_ts(&row.earned_at),
    })
}
