//! Point-in-time copies of a flow's structure. An assignment is evaluated
//! against its snapshot, so later edits to the live flow never change the
//! requirements for anyone mid-assignment.

use chrono::{DateTime, Utc};
use ramp_db::Database;
use ramp_db::models::format_ts;
use ramp_types::models::FlowSnapshot;
use tracing::info;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::map;

/// Deep-copy the flow's current structure. The copy happens inside one
/// storage transaction, so a concurrent edit cannot tear it. A flow with
/// zero steps snapshots fine.
pub fn create_snapshot(db: &Database, flow_id: Uuid) -> CoreResult<FlowSnapshot> {
    let id = Uuid::new_v4();
    match db.create_snapshot(&flow_id.to_string(), &id.to_string())? {
        Some(_version) => get_snapshot(db, id),
        None => Err(CoreError::not_found("flow", flow_id.to_string())),
    }
}

pub fn get_snapshot(db: &Database, id: Uuid) -> CoreResult<FlowSnapshot> {
    let row = db
        .get_snapshot(&id.to_string())?
        .ok_or_else(|| CoreError::not_found("snapshot", id.to_string()))?;
    let steps = db.get_snapshot_steps(&id.to_string())?;
    let components = db.get_snapshot_components(&id.to_string())?;
    map::snapshot_from_rows(row, steps, components)
}

pub fn get_latest_snapshot(db: &Database, flow_id: Uuid) -> CoreResult<Option<FlowSnapshot>> {
    match db.get_latest_snapshot(&flow_id.to_string())? {
        Some(row) => {
            let id = row.id.clone();
            let steps = db.get_snapshot_steps(&id)?;
            let components = db.get_snapshot_components(&id)?;
            Ok(Some(map::snapshot_from_rows(row, steps, components)?))
        }
        None => Ok(None),
    }
}

pub fn get_snapshot_by_version(
    db: &Database,
    flow_id: Uuid,
    version: i64,
) -> CoreResult<Option<FlowSnapshot>> {
    match db.get_snapshot_by_version(&flow_id.to_string(), version)? {
        Some(row) => {
            let id = row.id.clone();
            let steps = db.get_snapshot_steps(&id)?;
            let components = db.get_snapshot_components(&id)?;
            Ok(Some(map::snapshot_from_rows(row, steps, components)?))
        }
        None => Ok(None),
    }
}

/// Delete one snapshot, refusing while any non-completed assignment still
/// points at it.
pub fn delete_snapshot(db: &Database, id: Uuid) -> CoreResult<()> {
    let key = id.to_string();
    if db.get_snapshot(&key)?.is_none() {
        return Err(CoreError::not_found("snapshot", key));
    }

    if db.has_active_assignments(&key)? {
        let assignment_ids = db.assignment_ids_for_snapshots(std::slice::from_ref(&key))?;
        return Err(CoreError::VersionInUse {
            what: "snapshot",
            id: key,
            assignment_ids,
        });
    }

    db.delete_snapshot(&key)?;
    Ok(())
}

/// GC sweep: drop snapshots older than `cutoff` that no live assignment
/// references. Returns how many were pruned.
pub fn prune_old_snapshots(db: &Database, cutoff: DateTime<Utc>) -> CoreResult<usize> {
    let candidates = db.get_old_snapshots(&format_ts(cutoff))?;

    let mut pruned = 0;
    for snapshot in candidates {
        if db.has_active_assignments(&snapshot.id)? {
            continue;
        }
        db.delete_snapshot(&snapshot.id)?;
        pruned += 1;
    }

    if pruned > 0 {
        info!("Pruned {} old snapshots", pruned);
    }
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{self, NewFlow};
    use crate::testutil::{seed_employee, seed_moderator, test_db};
    use ramp_types::models::{ComponentPayload, QuizOption, QuizQuestion};

    fn quiz() -> ComponentPayload {
        ComponentPayload::Quiz {
            questions: vec![QuizQuestion {
                text: "Which door is the fire exit?".into(),
                options: vec![
                    QuizOption {
                        text: "East".into(),
                        correct: true,
                        points: 3,
                    },
                    QuizOption {
                        text: "West".into(),
                        correct: false,
                        points: 0,
                    },
                ],
            }],
            pass_score: 3,
        }
    }

    #[test]
    fn snapshot_copies_structure_and_survives_edits() {
        let db = test_db();
        let user = seed_moderator(&db);
        let flow = content::create_flow(
            &db,
            NewFlow {
                name: "Safety training".into(),
                description: "mandatory".into(),
                sequential: true,
                allow_self_pause: false,
                created_by: user,
            },
        )
        .unwrap();
        let step = content::add_step(&db, flow.id, "Fire drill", "walk the route", true, None)
            .unwrap();
        content::add_component(&db, step.id, "Exit quiz", true, &quiz(), None).unwrap();

        let snapshot = create_snapshot(&db, flow.id).unwrap();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.name, "Safety training");
        assert_eq!(snapshot.steps.len(), 1);
        assert_eq!(snapshot.total_components_count(), 1);
        assert!(snapshot.settings.sequential);

        // Edit the live flow afterwards; the snapshot must not move.
        content::update_flow(
            &db,
            flow.id,
            content::FlowPatch {
                name: Some("Renamed".into()),
                description: None,
                sequential: Some(false),
                allow_self_pause: None,
            },
        )
        .unwrap();
        content::add_step(&db, flow.id, "New step", "", true, None).unwrap();

        let reread = get_snapshot(&db, snapshot.id).unwrap();
        assert_eq!(reread.name, "Safety training");
        assert_eq!(reread.steps.len(), 1);
        assert_eq!(reread.steps[0].title, "Fire drill");
        let payload = &reread.steps[0].components[0].payload;
        assert_eq!(payload.max_score(), 3);
    }

    #[test]
    fn snapshots_version_independently() {
        let db = test_db();
        let user = seed_moderator(&db);
        let flow = content::create_flow(
            &db,
            NewFlow {
                name: "Tooling".into(),
                description: String::new(),
                sequential: false,
                allow_self_pause: true,
                created_by: user,
            },
        )
        .unwrap();

        let s1 = create_snapshot(&db, flow.id).unwrap();
        content::add_step(&db, flow.id, "Added later", "", true, None).unwrap();
        let s2 = create_snapshot(&db, flow.id).unwrap();

        assert_eq!((s1.version, s2.version), (1, 2));
        assert_eq!(
            get_latest_snapshot(&db, flow.id).unwrap().unwrap().id,
            s2.id
        );
        let by_version = get_snapshot_by_version(&db, flow.id, 1).unwrap().unwrap();
        assert_eq!(by_version.id, s1.id);
        assert_eq!(by_version.steps.len(), 0);
        assert_eq!(s2.steps.len(), 1);
    }

    #[test]
    fn empty_flow_snapshots_fine() {
        let db = test_db();
        let user = seed_moderator(&db);
        let flow = content::create_flow(
            &db,
            NewFlow {
                name: "Empty".into(),
                description: String::new(),
                sequential: false,
                allow_self_pause: true,
                created_by: user,
            },
        )
        .unwrap();

        let snapshot = create_snapshot(&db, flow.id).unwrap();
        assert!(snapshot.steps.is_empty());
        assert_eq!(snapshot.total_components_count(), 0);
    }

    #[test]
    fn delete_guarded_by_active_assignments() {
        let db = test_db();
        let moderator = seed_moderator(&db);
        let employee = seed_employee(&db);
        let flow = crate::testutil::seed_flow(&db, moderator, true);
        crate::versioning::publish_flow(&db, flow.id).unwrap();

        let assignment = crate::assignment::assign_flow(
            &db,
            crate::assignment::AssignParams {
                flow_id: flow.id,
                user_id: employee,
                buddy_id: None,
                assigned_by: moderator,
                due_date: None,
            },
        )
        .unwrap();

        let err = delete_snapshot(&db, assignment.snapshot_id).unwrap_err();
        match err {
            CoreError::VersionInUse { assignment_ids, .. } => {
                assert_eq!(assignment_ids, vec![assignment.id.to_string()]);
            }
            other => panic!("expected VersionInUse, got {other:?}"),
        }

        // A snapshot without assignments deletes fine.
        let orphan = create_snapshot(&db, flow.id).unwrap();
        delete_snapshot(&db, orphan.id).unwrap();
        assert!(db.get_snapshot(&orphan.id.to_string()).unwrap().is_none());
    }

    #[test]
    fn prune_skips_referenced_snapshots() {
        let db = test_db();
        let moderator = seed_moderator(&db);
        let employee = seed_employee(&db);
        let flow = crate::testutil::seed_flow(&db, moderator, true);
        crate::versioning::publish_flow(&db, flow.id).unwrap();

        crate::assignment::assign_flow(
            &db,
            crate::assignment::AssignParams {
                flow_id: flow.id,
                user_id: employee,
                buddy_id: None,
                assigned_by: moderator,
                due_date: None,
            },
        )
        .unwrap();
        create_snapshot(&db, flow.id).unwrap();

        // Cutoff in the future: both snapshots are candidates, but the
        // assigned one must survive.
        let pruned =
            prune_old_snapshots(&db, Utc::now() + chrono::Duration::days(1)).unwrap();
        assert_eq!(pruned, 1);
    }
}
