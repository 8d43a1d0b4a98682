//! Assignment lifecycle. Assigned -> InProgress -> Completed, with a
//! Paused side branch off InProgress. Completed is terminal. Every status
//! write is a compare-and-swap on `row_version`, so two racing updates
//! cannot both win.

use chrono::{DateTime, Utc};
use ramp_db::Database;
use ramp_db::models::{AssignmentRow, format_ts};
use ramp_types::models::{AssignmentStatus, FlowAssignment, NotificationKind};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::{achievements, content, map, notify, progress, snapshot, versioning};

pub struct AssignParams {
    pub flow_id: Uuid,
    pub user_id: Uuid,
    pub buddy_id: Option<Uuid>,
    pub assigned_by: Uuid,
    pub due_date: Option<DateTime<Utc>>,
}

/// Assign a flow to a user: capture an immutable snapshot of the active
/// content, create the assignment against it, seed the progress tree, and
/// notify the assignee.
pub fn assign_flow(db: &Database, params: AssignParams) -> CoreResult<FlowAssignment> {
    for (what, id) in [("user", params.user_id), ("user", params.assigned_by)]
        .into_iter()
        .chain(params.buddy_id.map(|b| ("user", b)))
    {
        if db.get_user_by_id(&id.to_string())?.is_none() {
            return Err(CoreError::not_found(what, id.to_string()));
        }
    }

    let flow = content::get_flow(db, params.flow_id)?;
    if !flow.is_active {
        return Err(CoreError::Validation("flow is deleted".into()));
    }
    if versioning::get_active_version(db, params.flow_id)?.is_none() {
        return Err(CoreError::Validation(
            "flow has no published version".into(),
        ));
    }

    let snap = snapshot::create_snapshot(db, params.flow_id)?;

    let seed: Vec<(String, String)> = snap
        .steps
        .iter()
        .flat_map(|step| {
            step.components
                .iter()
                .map(move |c| (c.id.to_string(), step.id.to_string()))
        })
        .collect();

    let id = Uuid::new_v4();
    db.insert_assignment_with_progress(
        &id.to_string(),
        &params.user_id.to_string(),
        &params.flow_id.to_string(),
        &snap.id.to_string(),
        params.buddy_id.map(|b| b.to_string()).as_deref(),
        &params.assigned_by.to_string(),
        params.due_date.map(format_ts).as_deref(),
        &seed,
    )?;

    notify::notify(
        db,
        params.user_id,
        NotificationKind::FlowAssigned,
        &format!("You have been assigned \"{}\"", flow.name),
        Some(id),
    )?;

    get_assignment(db, id)
}

pub fn get_assignment(db: &Database, id: Uuid) -> CoreResult<FlowAssignment> {
    map::assignment_from_row(load_row(db, id)?)
}

pub fn list_for_user(db: &Database, user_id: Uuid) -> CoreResult<Vec<FlowAssignment>> {
    db.list_assignments_for_user(&user_id.to_string())?
        .into_iter()
        .map(map::assignment_from_row)
        .collect()
}

/// Assigned -> InProgress.
pub fn start(db: &Database, id: Uuid) -> CoreResult<FlowAssignment> {
    let mut row = load_row(db, id)?;
    require_status(&row, AssignmentStatus::Assigned, AssignmentStatus::InProgress)?;

    row.status = AssignmentStatus::InProgress.as_str().to_string();
    row.started_at = Some(format_ts(Utc::now()));
    commit(db, row)?;
    get_assignment(db, id)
}

/// InProgress -> Paused. Only legal when the snapshot's settings allow
/// self-pause.
pub fn pause(db: &Database, id: Uuid, reason: &str) -> CoreResult<FlowAssignment> {
    let mut row = load_row(db, id)?;
    require_status(&row, AssignmentStatus::InProgress, AssignmentStatus::Paused)?;

    let snap = db
        .get_snapshot(&row.snapshot_id)?
        .ok_or_else(|| CoreError::Corrupt(format!("snapshot {} missing", row.snapshot_id)))?;
    if !snap.allow_self_pause {
        return Err(CoreError::Validation(
            "flow settings do not permit pausing".into(),
        ));
    }

    row.status = AssignmentStatus::Paused.as_str().to_string();
    row.paused_at = Some(format_ts(Utc::now()));
    row.pause_reason = Some(reason.to_string());
    commit(db, row)?;
    get_assignment(db, id)
}

/// Paused -> InProgress; pause fields are cleared.
pub fn resume(db: &Database, id: Uuid) -> CoreResult<FlowAssignment> {
    let mut row = load_row(db, id)?;
    require_status(&row, AssignmentStatus::Paused, AssignmentStatus::InProgress)?;

    row.status = AssignmentStatus::InProgress.as_str().to_string();
    row.paused_at = None;
    row.pause_reason = None;
    commit(db, row)?;
    get_assignment(db, id)
}

/// InProgress -> Completed. Requires every required step complete, unless
/// non-empty `notes` document an explicit override.
pub fn complete(db: &Database, id: Uuid, notes: Option<&str>) -> CoreResult<FlowAssignment> {
    let mut row = load_row(db, id)?;
    require_status(&row, AssignmentStatus::InProgress, AssignmentStatus::Completed)?;

    let rollup = progress::assignment_progress(db, id)?;
    if !rollup.is_complete {
        match notes {
            Some(n) if !n.trim().is_empty() => {}
            _ => {
                return Err(CoreError::Validation(
                    "required steps incomplete; completion notes are required to override".into(),
                ));
            }
        }
    }

    row.status = AssignmentStatus::Completed.as_str().to_string();
    row.completed_at = Some(format_ts(Utc::now()));
    row.completion_notes = notes.map(|n| n.to_string());
    row.final_score = Some(db.total_best_score(&row.id)?);
    let user_id = map::parse_id(&row.user_id)?;
    commit(db, row)?;

    notify::notify(
        db,
        user_id,
        NotificationKind::FlowCompleted,
        "You completed an assigned flow",
        Some(id),
    )?;
    achievements::grant_first_completion(db, user_id)?;

    get_assignment(db, id)
}

fn load_row(db: &Database, id: Uuid) -> CoreResult<AssignmentRow> {
    db.get_assignment(&id.to_string())?
        .ok_or_else(|| CoreError::not_found("assignment", id.to_string()))
}

fn require_status(
    row: &AssignmentRow,
    expected: AssignmentStatus,
    attempted: AssignmentStatus,
) -> CoreResult<()> {
    let from = AssignmentStatus::parse(&row.status)
        .ok_or_else(|| CoreError::Corrupt(format!("bad assignment status '{}'", row.status)))?;
    if from != expected {
        return Err(CoreError::InvalidStateTransition {
            from,
            to: attempted,
        });
    }
    Ok(())
}

fn commit(db: &Database, row: AssignmentRow) -> CoreResult<()> {
    if !db.update_assignment(&row)? {
        return Err(CoreError::ConcurrencyConflict {
            what: "assignment",
            id: row.id,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_employee, seed_flow, seed_moderator, test_db};

    fn assigned(db: &Database) -> FlowAssignment {
        let moderator = seed_moderator(db);
        let employee = seed_employee(db);
        let flow = seed_flow(db, moderator, true);
        crate::versioning::publish_flow(db, flow.id).unwrap();
        assign_flow(
            db,
            AssignParams {
                flow_id: flow.id,
                user_id: employee,
                buddy_id: None,
                assigned_by: moderator,
                due_date: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn assign_requires_published_version() {
        let db = test_db();
        let moderator = seed_moderator(&db);
        let employee = seed_employee(&db);
        let flow = seed_flow(&db, moderator, true);

        let err = assign_flow(
            &db,
            AssignParams {
                flow_id: flow.id,
                user_id: employee,
                buddy_id: None,
                assigned_by: moderator,
                due_date: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn happy_path_lifecycle() {
        let db = test_db();
        let a = assigned(&db);
        assert_eq!(a.status, AssignmentStatus::Assigned);
        assert!(a.started_at.is_none());

        let a = start(&db, a.id).unwrap();
        assert_eq!(a.status, AssignmentStatus::InProgress);
        assert!(a.started_at.is_some());

        // The seeded flow has one required article; finish it, then complete.
        let view = crate::progress::assignment_progress(&db, a.id).unwrap();
        let component = view.steps[0].components[0].component_snapshot_id;
        crate::progress::submit(
            &db,
            a.id,
            component,
            &ramp_types::models::Submission::Article {
                time_spent_minutes: Some(3),
            },
        )
        .unwrap();

        let done = get_assignment(&db, a.id).unwrap();
        assert_eq!(done.status, AssignmentStatus::Completed);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn cannot_start_twice_or_leave_completed() {
        let db = test_db();
        let a = assigned(&db);
        start(&db, a.id).unwrap();

        let err = start(&db, a.id).unwrap_err();
        assert!(matches!(err, CoreError::InvalidStateTransition { .. }));

        complete(&db, a.id, Some("signed off by buddy")).unwrap();
        let err = start(&db, a.id).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidStateTransition {
                from: AssignmentStatus::Completed,
                ..
            }
        ));
    }

    #[test]
    fn cannot_complete_without_starting() {
        let db = test_db();
        let a = assigned(&db);
        let err = complete(&db, a.id, None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidStateTransition {
                from: AssignmentStatus::Assigned,
                to: AssignmentStatus::Completed,
            }
        ));
    }

    #[test]
    fn complete_with_unfinished_steps_needs_notes() {
        let db = test_db();
        let a = assigned(&db);
        start(&db, a.id).unwrap();

        let err = complete(&db, a.id, None).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let done = complete(&db, a.id, Some("waived during pilot")).unwrap();
        assert_eq!(done.status, AssignmentStatus::Completed);
        assert_eq!(done.completion_notes.as_deref(), Some("waived during pilot"));
    }

    #[test]
    fn pause_and_resume() {
        let db = test_db();
        let a = assigned(&db);
        start(&db, a.id).unwrap();

        let paused = pause(&db, a.id, "parental leave").unwrap();
        assert_eq!(paused.status, AssignmentStatus::Paused);
        assert_eq!(paused.pause_reason.as_deref(), Some("parental leave"));
        assert!(paused.paused_at.is_some());

        let resumed = resume(&db, a.id).unwrap();
        assert_eq!(resumed.status, AssignmentStatus::InProgress);
        assert!(resumed.paused_at.is_none());
        assert!(resumed.pause_reason.is_none());
    }

    #[test]
    fn pause_respects_flow_settings() {
        let db = test_db();
        let moderator = seed_moderator(&db);
        let employee = seed_employee(&db);
        let flow = crate::content::create_flow(
            &db,
            crate::content::NewFlow {
                name: "No breaks".into(),
                description: String::new(),
                sequential: false,
                allow_self_pause: false,
                created_by: moderator,
            },
        )
        .unwrap();
        crate::versioning::publish_flow(&db, flow.id).unwrap();

        let a = assign_flow(
            &db,
            AssignParams {
                flow_id: flow.id,
                user_id: employee,
                buddy_id: None,
                assigned_by: moderator,
                due_date: None,
            },
        )
        .unwrap();
        start(&db, a.id).unwrap();

        let err = pause(&db, a.id, "trying anyway").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn stale_writer_loses_the_race() {
        let db = test_db();
        let a = assigned(&db);

        // Two handlers read the same row; the first transition wins.
        let stale = db.get_assignment(&a.id.to_string()).unwrap().unwrap();
        start(&db, a.id).unwrap();

        assert!(!db.update_assignment(&stale).unwrap());
    }

    #[test]
    fn overdue_is_a_predicate_not_a_state() {
        let db = test_db();
        let moderator = seed_moderator(&db);
        let employee = seed_employee(&db);
        let flow = seed_flow(&db, moderator, true);
        crate::versioning::publish_flow(&db, flow.id).unwrap();

        let a = assign_flow(
            &db,
            AssignParams {
                flow_id: flow.id,
                user_id: employee,
                buddy_id: None,
                assigned_by: moderator,
                due_date: Some(Utc::now() - chrono::Duration::days(1)),
            },
        )
        .unwrap();

        assert_eq!(a.status, AssignmentStatus::Assigned);
        assert!(a.is_overdue(Utc::now()));

        let done = {
            start(&db, a.id).unwrap();
            complete(&db, a.id, Some("late but done")).unwrap()
        };
        assert!(!done.is_overdue(Utc::now()));
    }
}
