//! Persisted notification records. Delivery channels live elsewhere; the
//! core only writes and lists.

use chrono::Utc;
use ramp_db::Database;
use ramp_db::models::format_ts;
use ramp_types::models::{Notification, NotificationKind};
use tracing::info;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::map;

pub fn notify(
    db: &Database,
    user_id: Uuid,
    kind: NotificationKind,
    message: &str,
    assignment_id: Option<Uuid>,
) -> CoreResult<()> {
    db.insert_notification(
        &Uuid::new_v4().to_string(),
        &user_id.to_string(),
        kind.as_str(),
        message,
        assignment_id.map(|a| a.to_string()).as_deref(),
    )?;
    Ok(())
}

pub fn list_for_user(db: &Database, user_id: Uuid) -> CoreResult<Vec<Notification>> {
    db.list_notifications(&user_id.to_string())?
        .into_iter()
        .map(map::notification_from_row)
        .collect()
}

pub fn mark_read(db: &Database, id: Uuid, user_id: Uuid) -> CoreResult<()> {
    if !db.mark_notification_read(&id.to_string(), &user_id.to_string())? {
        return Err(CoreError::not_found("notification", id.to_string()));
    }
    Ok(())
}

/// Notify assignees whose due date slipped past, once per assignment.
/// Returns the number of notifications written.
pub fn sweep_overdue(db: &Database) -> CoreResult<usize> {
    let overdue = db.overdue_unnotified(&format_ts(Utc::now()))?;

    let count = overdue.len();
    for row in overdue {
        let user_id = map::parse_id(&row.user_id)?;
        notify(
            db,
            user_id,
            NotificationKind::AssignmentOverdue,
            "An assigned flow is past its due date",
            Some(map::parse_id(&row.id)?),
        )?;
        db.mark_overdue_notified(&row.id)?;
    }

    if count > 0 {
        info!("Overdue sweep: notified {} assignments", count);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::{AssignParams, assign_flow};
    use crate::testutil::{seed_employee, seed_flow, seed_moderator, test_db};

    #[test]
    fn assignment_produces_a_notification() {
        let db = test_db();
        let moderator = seed_moderator(&db);
        let employee = seed_employee(&db);
        let flow = seed_flow(&db, moderator, true);
        crate::versioning::publish_flow(&db, flow.id).unwrap();

        assign_flow(
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

        let list = list_for_user(&db, employee).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].kind, NotificationKind::FlowAssigned);
        assert!(!list[0].is_read);

        mark_read(&db, list[0].id, employee).unwrap();
        assert!(list_for_user(&db, employee).unwrap()[0].is_read);
    }

    #[test]
    fn overdue_sweep_notifies_once() {
        let db = test_db();
        let moderator = seed_moderator(&db);
        let employee = seed_employee(&db);
        let flow = seed_flow(&db, moderator, true);
        crate::versioning::publish_flow(&db, flow.id).unwrap();

        assign_flow(
            &db,
            AssignParams {
                flow_id: flow.id,
                user_id: employee,
                buddy_id: None,
                assigned_by: moderator,
                due_date: Some(Utc::now() - chrono::Duration::hours(2)),
            },
        )
        .unwrap();

        assert_eq!(sweep_overdue(&db).unwrap(), 1);
        // Second sweep finds nothing new.
        assert_eq!(sweep_overdue(&db).unwrap(), 0);

        let kinds: Vec<_> = list_for_user(&db, employee)
            .unwrap()
            .into_iter()
            .map(|n| n.kind)
            .collect();
        assert!(kinds.contains(&NotificationKind::AssignmentOverdue));
    }

    #[test]
    fn mark_read_is_owner_scoped() {
        let db = test_db();
        let moderator = seed_moderator(&db);
        let employee = seed_employee(&db);

        notify(
            &db,
            employee,
            NotificationKind::FlowAssigned,
            "hello",
            None,
        )
        .unwrap();
        let n = &list_for_user(&db, employee).unwrap()[0];

        let err = mark_read(&db, n.id, moderator).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
