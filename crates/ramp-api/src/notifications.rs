use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use ramp_core::{achievements, notify};
use ramp_types::api::{AchievementResponse, Claims, NotificationResponse};

use crate::auth::AppState;
use crate::error::blocking;

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.sub;

    let list = blocking(move || notify::list_for_user(&state.db, user_id)).await?;

    let list: Vec<NotificationResponse> = list
        .into_iter()
        .map(|n| NotificationResponse {
            id: n.id,
            kind: n.kind.as_str().to_string(),
            message: n.message,
            assignment_id: n.assignment_id,
            is_read: n.is_read,
            created_at: n.created_at,
        })
        .collect();

    Ok(Json(list))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.sub;

    blocking(move || notify::mark_read(&state.db, notification_id, user_id)).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_achievements(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let list = blocking(move || achievements::list_for_user(&state.db, user_id)).await?;

    let list: Vec<AchievementResponse> = list
        .into_iter()
        .map(|a| AchievementResponse {
            id: a.id,
            code: a.code,
            title: a.title,
            earned_at: a.earned_at,
        })
        .collect();

    Ok(Json(list))
}
