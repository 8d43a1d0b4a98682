use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use ramp_core::assignment::{self, AssignParams};
use ramp_core::{CoreError, CoreResult, progress};
use ramp_db::Database;
use ramp_types::api::{
    AssignRequest, AssignmentResponse, Claims, CompleteRequest, PauseRequest, SubmitRequest,
    SubmitResponse,
};
use ramp_types::models::FlowAssignment;

use crate::auth::AppState;
use crate::error::blocking;
use crate::middleware::require_moderator;

pub async fn assign_flow(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(flow_id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;
    let assigned_by = claims.sub;

    let response = blocking(move || {
        let a = assignment::assign_flow(
            &state.db,
            AssignParams {
                flow_id,
                user_id: req.user_id,
                buddy_id: req.buddy_id,
                assigned_by,
                due_date: req.due_date,
            },
        )?;
        assignment_response(&state.db, a)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_assignment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let response = blocking(move || {
        let a = assignment::get_assignment(&state.db, assignment_id)?;
        authorize_view(&claims, &a)?;
        assignment_response(&state.db, a)
    })
    .await?;

    Ok(Json(response))
}

pub async fn my_assignments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.sub;

    let list = blocking(move || {
        let assignments = assignment::list_for_user(&state.db, user_id)?;
        assignments
            .into_iter()
            .map(|a| assignment_response(&state.db, a))
            .collect::<CoreResult<Vec<_>>>()
    })
    .await?;

    Ok(Json(list))
}

pub async fn start(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let response = blocking(move || {
        authorize_act(&state.db, &claims, assignment_id)?;
        let a = assignment::start(&state.db, assignment_id)?;
        assignment_response(&state.db, a)
    })
    .await?;

    Ok(Json(response))
}

pub async fn pause(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<Uuid>,
    Json(req): Json<PauseRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let response = blocking(move || {
        authorize_act(&state.db, &claims, assignment_id)?;
        let a = assignment::pause(&state.db, assignment_id, &req.reason)?;
        assignment_response(&state.db, a)
    })
    .await?;

    Ok(Json(response))
}

pub async fn resume(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let response = blocking(move || {
        authorize_act(&state.db, &claims, assignment_id)?;
        let a = assignment::resume(&state.db, assignment_id)?;
        assignment_response(&state.db, a)
    })
    .await?;

    Ok(Json(response))
}

pub async fn complete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<Uuid>,
    Json(req): Json<CompleteRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let response = blocking(move || {
        authorize_act(&state.db, &claims, assignment_id)?;
        let a = assignment::complete(&state.db, assignment_id, req.notes.as_deref())?;
        assignment_response(&state.db, a)
    })
    .await?;

    Ok(Json(response))
}

pub async fn get_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let view = blocking(move || {
        let a = assignment::get_assignment(&state.db, assignment_id)?;
        authorize_view(&claims, &a)?;
        progress::assignment_progress(&state.db, assignment_id)
    })
    .await?;

    Ok(Json(view))
}

pub async fn submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assignment_id, component_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let outcome = blocking(move || {
        authorize_act(&state.db, &claims, assignment_id)?;

        // A lost optimistic-concurrency race on the auto-complete path is
        // retried once with fresh reads, then surfaced.
        match progress::submit(&state.db, assignment_id, component_id, &req.submission) {
            Err(CoreError::ConcurrencyConflict { .. }) => {
                progress::submit(&state.db, assignment_id, component_id, &req.submission)
            }
            other => other,
        }
    })
    .await
    .map(|o| SubmitResponse {
        completed: o.completed,
        score: o.score,
        best_score: o.best_score,
        attempts_count: o.attempts_count,
        assignment_status: o.assignment_status,
        overall_progress: o.overall_progress,
    })?;

    Ok(Json(outcome))
}

/// Assignees, their buddy, and moderators may read an assignment.
fn authorize_view(claims: &Claims, a: &FlowAssignment) -> Result<(), CoreError> {
    let allowed = claims.role.can_moderate()
        || a.user_id == claims.sub
        || a.buddy_id == Some(claims.sub)
        || a.assigned_by == claims.sub;
    if allowed {
        Ok(())
    } else {
        // Invisible rather than forbidden, to avoid leaking assignment ids.
        Err(CoreError::not_found("assignment", a.id.to_string()))
    }
}

/// Lifecycle actions belong to the assignee (moderators may intervene).
fn authorize_act(db: &Database, claims: &Claims, assignment_id: Uuid) -> Result<(), CoreError> {
    let a = assignment::get_assignment(db, assignment_id)?;
    if claims.role.can_moderate() || a.user_id == claims.sub {
        Ok(())
    } else {
        Err(CoreError::not_found("assignment", a.id.to_string()))
    }
}

fn assignment_response(db: &Database, a: FlowAssignment) -> CoreResult<AssignmentResponse> {
    let overall_progress = progress::assignment_progress(db, a.id)?.overall_progress;
    Ok(AssignmentResponse {
        id: a.id,
        user_id: a.user_id,
        flow_id: a.flow_id,
        snapshot_id: a.snapshot_id,
        buddy_id: a.buddy_id,
        assigned_by: a.assigned_by,
        status: a.status,
        overdue: a.is_overdue(Utc::now()),
        overall_progress,
        assigned_at: a.assigned_at,
        started_at: a.started_at,
        due_date: a.due_date,
        completed_at: a.completed_at,
        final_score: a.final_score,
    })
}
