//! Achievement record-keeping. Unlock rules beyond the built-in
//! first-completion grant live with the callers.

use ramp_db::Database;
use ramp_types::models::Achievement;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::map;

pub const FIRST_FLOW_COMPLETE: &str = "first-flow-complete";

/// Grant the first-completion achievement; a no-op on every completion
/// after the first thanks to the (user, code) uniqueness.
pub fn grant_first_completion(db: &Database, user_id: Uuid) -> CoreResult<bool> {
    Ok(db.grant_achievement(
        &Uuid::new_v4().to_string(),
        &user_id.to_string(),
        FIRST_FLOW_COMPLETE,
        "Completed your first flow",
    )?)
}

pub fn list_for_user(db: &Database, user_id: Uuid) -> CoreResult<Vec<Achievement>> {
    db.list_achievements(&user_id.to_string())?
        .into_iter()
        .map(map::achievement_from_row)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_employee, test_db};

    #[test]
    fn first_completion_grant_is_idempotent() {
        let db = test_db();
        let user = seed_employee(&db);

        assert!(grant_first_completion(&db, user).unwrap());
        assert!(!grant_first_completion(&db, user).unwrap());

        let list = list_for_user(&db, user).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].code, FIRST_FLOW_COMPLETE);
    }
}
