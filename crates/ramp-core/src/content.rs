//! CRUD over the live editing surface: flows, steps, components.
//! Ordering uses fractional ranks, so inserting between siblings never
//! renumbers anything.

use ramp_db::Database;
use ramp_types::models::{Component, ComponentPayload, Flow, FlowStep};
use ramp_types::order::OrderKey;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::map;

pub struct NewFlow {
    pub name: String,
    pub description: String,
    pub sequential: bool,
    pub allow_self_pause: bool,
    pub created_by: Uuid,
}

pub fn create_flow(db: &Database, new: NewFlow) -> CoreResult<Flow> {
    if new.name.trim().is_empty() {
        return Err(CoreError::Validation("flow name must not be empty".into()));
    }

    let id = Uuid::new_v4();
    db.insert_flow(
        &id.to_string(),
        &new.name,
        &new.description,
        &new.created_by.to_string(),
        new.sequential,
        new.allow_self_pause,
    )?;
    get_flow(db, id)
}

pub fn get_flow(db: &Database, id: Uuid) -> CoreResult<Flow> {
    let row = db
        .get_flow(&id.to_string())?
        .ok_or_else(|| CoreError::not_found("flow", id.to_string()))?;
    map::flow_from_row(row)
}

pub fn list_flows(db: &Database, include_inactive: bool) -> CoreResult<Vec<Flow>> {
    db.list_flows(include_inactive)?
        .into_iter()
        .map(map::flow_from_row)
        .collect()
}

pub struct FlowPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sequential: Option<bool>,
    pub allow_self_pause: Option<bool>,
}

pub fn update_flow(db: &Database, id: Uuid, patch: FlowPatch) -> CoreResult<Flow> {
    let current = get_flow(db, id)?;

    let name = patch.name.unwrap_or(current.name);
    if name.trim().is_empty() {
        return Err(CoreError::Validation("flow name must not be empty".into()));
    }
    let description = patch.description.unwrap_or(current.description);
    let sequential = patch.sequential.unwrap_or(current.settings.sequential);
    let allow_self_pause = patch
        .allow_self_pause
        .unwrap_or(current.settings.allow_self_pause);

    db.update_flow(
        &id.to_string(),
        &name,
        &description,
        sequential,
        allow_self_pause,
    )?;
    get_flow(db, id)
}

/// Soft delete. History (versions, snapshots, assignments) stays.
pub fn delete_flow(db: &Database, id: Uuid) -> CoreResult<()> {
    if !db.deactivate_flow(&id.to_string())? {
        return Err(CoreError::not_found("flow", id.to_string()));
    }
    Ok(())
}

// -- Steps --

pub fn add_step(
    db: &Database,
    flow_id: Uuid,
    title: &str,
    description: &str,
    required: bool,
    after: Option<Uuid>,
) -> CoreResult<FlowStep> {
    if title.trim().is_empty() {
        return Err(CoreError::Validation("step title must not be empty".into()));
    }
    let flow = get_flow(db, flow_id)?;
    if !flow.is_active {
        return Err(CoreError::Validation("flow is deleted".into()));
    }

    let rank = step_rank_for_insert(db, flow_id, after)?;
    let id = Uuid::new_v4();
    db.insert_step(
        &id.to_string(),
        &flow_id.to_string(),
        title,
        description,
        rank.as_str(),
        required,
    )?;
    get_step(db, id)
}

pub fn get_step(db: &Database, id: Uuid) -> CoreResult<FlowStep> {
    let row = db
        .get_step(&id.to_string())?
        .ok_or_else(|| CoreError::not_found("step", id.to_string()))?;
    map::step_from_row(row)
}

pub fn list_steps(db: &Database, flow_id: Uuid) -> CoreResult<Vec<FlowStep>> {
    db.list_steps(&flow_id.to_string())?
        .into_iter()
        .map(map::step_from_row)
        .collect()
}

pub fn update_step(
    db: &Database,
    id: Uuid,
    title: Option<&str>,
    description: Option<&str>,
    required: Option<bool>,
) -> CoreResult<FlowStep> {
    let current = get_step(db, id)?;

    let title = title.unwrap_or(&current.title);
    if title.trim().is_empty() {
        return Err(CoreError::Validation("step title must not be empty".into()));
    }
    let description = description.unwrap_or(&current.description);
    let required = required.unwrap_or(current.required);

    db.update_step(&id.to_string(), title, description, required)?;
    get_step(db, id)
}

pub fn delete_step(db: &Database, id: Uuid) -> CoreResult<()> {
    if !db.delete_step(&id.to_string())? {
        return Err(CoreError::not_found("step", id.to_string()));
    }
    Ok(())
}

// -- Components --

pub fn add_component(
    db: &Database,
    step_id: Uuid,
    title: &str,
    required: bool,
    payload: &ComponentPayload,
    after: Option<Uuid>,
) -> CoreResult<Component> {
    if title.trim().is_empty() {
        return Err(CoreError::Validation(
            "component title must not be empty".into(),
        ));
    }
    payload.validate().map_err(CoreError::Validation)?;
    get_step(db, step_id)?;

    let rank = component_rank_for_insert(db, step_id, after)?;
    let id = Uuid::new_v4();
    let payload_json =
        serde_json::to_string(payload).map_err(|e| CoreError::Validation(e.to_string()))?;
    db.insert_component(
        &id.to_string(),
        &step_id.to_string(),
        title,
        rank.as_str(),
        required,
        &payload_json,
    )?;
    get_component(db, id)
}

pub fn get_component(db: &Database, id: Uuid) -> CoreResult<Component> {
    let row = db
        .get_component(&id.to_string())?
        .ok_or_else(|| CoreError::not_found("component", id.to_string()))?;
    map::component_from_row(row)
}

pub fn list_components(db: &Database, step_id: Uuid) -> CoreResult<Vec<Component>> {
    db.list_components(&step_id.to_string())?
        .into_iter()
        .map(map::component_from_row)
        .collect()
}

pub fn update_component(
    db: &Database,
    id: Uuid,
    title: Option<&str>,
    required: Option<bool>,
    payload: Option<&ComponentPayload>,
) -> CoreResult<Component> {
    let current = get_component(db, id)?;

    let title = title.unwrap_or(&current.title);
    if title.trim().is_empty() {
        return Err(CoreError::Validation(
            "component title must not be empty".into(),
        ));
    }
    let required = required.unwrap_or(current.required);
    let payload = payload.unwrap_or(&current.payload);
    payload.validate().map_err(CoreError::Validation)?;

    let payload_json =
        serde_json::to_string(payload).map_err(|e| CoreError::Validation(e.to_string()))?;
    db.update_component(&id.to_string(), title, required, &payload_json)?;
    get_component(db, id)
}

pub fn delete_component(db: &Database, id: Uuid) -> CoreResult<()> {
    if !db.delete_component(&id.to_string())? {
        return Err(CoreError::not_found("component", id.to_string()));
    }
    Ok(())
}

// -- Rank allocation --

fn step_rank_for_insert(
    db: &Database,
    flow_id: Uuid,
    after: Option<Uuid>,
) -> CoreResult<OrderKey> {
    match after {
        None => {
            // Append at the end.
            match db.max_step_rank(&flow_id.to_string())? {
                Some(max) => Ok(OrderKey::after(&parse_rank(&max)?)),
                None => Ok(OrderKey::first()),
            }
        }
        Some(sibling_id) => {
            let sibling = get_step(db, sibling_id)?;
            if sibling.flow_id != flow_id {
                return Err(CoreError::Validation(
                    "sibling step belongs to a different flow".into(),
                ));
            }
            between_or_after(
                &sibling.rank,
                db.step_rank_after(&flow_id.to_string(), sibling.rank.as_str())?,
            )
        }
    }
}

fn component_rank_for_insert(
    db: &Database,
    step_id: Uuid,
    after: Option<Uuid>,
) -> CoreResult<OrderKey> {
    match after {
        None => match db.max_component_rank(&step_id.to_string())? {
            Some(max) => Ok(OrderKey::after(&parse_rank(&max)?)),
            None => Ok(OrderKey::first()),
        },
        Some(sibling_id) => {
            let sibling = get_component(db, sibling_id)?;
            if sibling.step_id != step_id {
                return Err(CoreError::Validation(
                    "sibling component belongs to a different step".into(),
                ));
            }
            between_or_after(
                &sibling.rank,
                db.component_rank_after(&step_id.to_string(), sibling.rank.as_str())?,
            )
        }
    }
}

fn between_or_after(prev: &OrderKey, next: Option<String>) -> CoreResult<OrderKey> {
    match next {
        Some(next) => OrderKey::between(prev, &parse_rank(&next)?)
            .map_err(|e| CoreError::Corrupt(e.to_string())),
        None => Ok(OrderKey::after(prev)),
    }
}

fn parse_rank(s: &str) -> CoreResult<OrderKey> {
    OrderKey::parse(s).map_err(|e| CoreError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_moderator, test_db};
    use ramp_types::models::{QuizOption, QuizQuestion};

    fn article() -> ComponentPayload {
        ComponentPayload::Article {
            body: "Welcome aboard".into(),
            reading_time_minutes: 5,
        }
    }

    #[test]
    fn create_flow_rejects_empty_name() {
        let db = test_db();
        let user = seed_moderator(&db);
        let err = create_flow(
            &db,
            NewFlow {
                name: "  ".into(),
                description: String::new(),
                sequential: false,
                allow_self_pause: true,
                created_by: user,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn steps_append_in_order() {
        let db = test_db();
        let user = seed_moderator(&db);
        let flow = create_flow(
            &db,
            NewFlow {
                name: "Onboarding".into(),
                description: String::new(),
                sequential: true,
                allow_self_pause: true,
                created_by: user,
            },
        )
        .unwrap();

        let s1 = add_step(&db, flow.id, "One", "", true, None).unwrap();
        let s2 = add_step(&db, flow.id, "Two", "", true, None).unwrap();
        let s3 = add_step(&db, flow.id, "Three", "", true, None).unwrap();

        let listed = list_steps(&db, flow.id).unwrap();
        assert_eq!(
            listed.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![s1.id, s2.id, s3.id]
        );
    }

    #[test]
    fn insert_between_does_not_touch_siblings() {
        let db = test_db();
        let user = seed_moderator(&db);
        let flow = create_flow(
            &db,
            NewFlow {
                name: "Onboarding".into(),
                description: String::new(),
                sequential: false,
                allow_self_pause: true,
                created_by: user,
            },
        )
        .unwrap();

        let s1 = add_step(&db, flow.id, "One", "", true, None).unwrap();
        let s2 = add_step(&db, flow.id, "Two", "", true, None).unwrap();

        let mid = add_step(&db, flow.id, "Between", "", true, Some(s1.id)).unwrap();

        let listed = list_steps(&db, flow.id).unwrap();
        assert_eq!(
            listed.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![s1.id, mid.id, s2.id]
        );
        // Neighbors keep their original ranks.
        assert_eq!(get_step(&db, s1.id).unwrap().rank, s1.rank);
        assert_eq!(get_step(&db, s2.id).unwrap().rank, s2.rank);
    }

    #[test]
    fn component_payload_is_validated() {
        let db = test_db();
        let user = seed_moderator(&db);
        let flow = create_flow(
            &db,
            NewFlow {
                name: "Onboarding".into(),
                description: String::new(),
                sequential: false,
                allow_self_pause: true,
                created_by: user,
            },
        )
        .unwrap();
        let step = add_step(&db, flow.id, "One", "", true, None).unwrap();

        let bad_quiz = ComponentPayload::Quiz {
            questions: vec![QuizQuestion {
                text: "Pick one".into(),
                options: vec![QuizOption {
                    text: "Nope".into(),
                    correct: false,
                    points: 1,
                }],
            }],
            pass_score: 1,
        };
        let err = add_component(&db, step.id, "Quiz", true, &bad_quiz, None).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let ok = add_component(&db, step.id, "Read me", true, &article(), None).unwrap();
        assert_eq!(ok.title, "Read me");
    }
}
