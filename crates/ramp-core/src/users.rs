use ramp_db::Database;
use ramp_types::models::User;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::map;

pub fn get_user(db: &Database, id: Uuid) -> CoreResult<User> {
    let row = db
        .get_user_by_id(&id.to_string())?
        .ok_or_else(|| CoreError::not_found("user", id.to_string()))?;
    map::user_from_row(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_moderator, test_db};
    use ramp_types::models::Role;

    #[test]
    fn round_trips_role() {
        let db = test_db();
        let id = seed_moderator(&db);
        let user = get_user(&db, id).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.role, Role::Moderator);
        assert!(user.role.can_moderate());
    }

    #[test]
    fn missing_user_is_not_found() {
        let db = test_db();
        let err = get_user(&db, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
