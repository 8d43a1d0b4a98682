//! Shared fixtures for the in-memory SQLite test databases.

use ramp_db::Database;
use ramp_types::models::{ComponentPayload, Flow};
use uuid::Uuid;

use crate::content::{self, NewFlow};

pub fn test_db() -> Database {
    Database::open_in_memory().expect("in-memory db")
}

pub fn seed_user(db: &Database, role: &str) -> Uuid {
    let id = Uuid::new_v4();
    db.create_user(
        &id.to_string(),
        &format!("user-{id}"),
        "not-a-real-hash",
        "Test User",
        role,
    )
    .expect("seed user");
    id
}

pub fn seed_moderator(db: &Database) -> Uuid {
    seed_user(db, "moderator")
}

pub fn seed_employee(db: &Database) -> Uuid {
    seed_user(db, "employee")
}

/// A plain non-sequential flow; with content, one required step holding
/// one required article.
pub fn seed_flow(db: &Database, created_by: Uuid, with_content: bool) -> Flow {
    let flow = content::create_flow(
        db,
        NewFlow {
            name: "Onboarding basics".into(),
            description: "start here".into(),
            sequential: false,
            allow_self_pause: true,
            created_by,
        },
    )
    .expect("seed flow");

    if with_content {
        let step = content::add_step(db, flow.id, "Intro", "", true, None).expect("seed step");
        content::add_component(
            db,
            step.id,
            "Welcome note",
            true,
            &ComponentPayload::Article {
                body: "Welcome to the team".into(),
                reading_time_minutes: 3,
            },
            None,
        )
        .expect("seed component");
    }

    flow
}
