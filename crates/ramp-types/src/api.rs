use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AssignmentStatus, ComponentPayload, Role, Submission,
};

// -- JWT Claims --

/// Canonical claims definition, shared by the REST middleware and any
/// future transport binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub display_name: String,
    /// Defaults to Employee. Ramp runs inside the corporate perimeter;
    /// role selection at registration is an operator convenience.
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Flows --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFlowRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sequential: bool,
    #[serde(default = "default_true")]
    pub allow_self_pause: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateFlowRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sequential: Option<bool>,
    pub allow_self_pause: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct FlowResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_by: Uuid,
    pub is_active: bool,
    pub sequential: bool,
    pub allow_self_pause: bool,
    /// Number of the currently active publication, if any.
    pub published_version: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Steps & components --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStepRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Insert directly after this sibling; omitted means append at the end.
    pub after: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStepRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub required: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateComponentRequest {
    pub title: String,
    #[serde(default = "default_true")]
    pub required: bool,
    pub payload: ComponentPayload,
    /// Insert directly after this sibling; omitted means append at the end.
    pub after: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateComponentRequest {
    pub title: Option<String>,
    pub required: Option<bool>,
    pub payload: Option<ComponentPayload>,
}

// -- Publishing --

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub id: Uuid,
    pub version: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// -- Assignments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignRequest {
    pub user_id: Uuid,
    pub buddy_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub flow_id: Uuid,
    pub snapshot_id: Uuid,
    pub buddy_id: Option<Uuid>,
    pub assigned_by: Uuid,
    pub status: AssignmentStatus,
    pub overdue: bool,
    pub overall_progress: u8,
    pub assigned_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub final_score: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PauseRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct CompleteRequest {
    /// Required when overriding completion with unfinished required steps.
    pub notes: Option<String>,
}

// -- Submissions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitRequest {
    pub submission: Submission,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub completed: bool,
    pub score: i64,
    pub best_score: i64,
    pub attempts_count: i64,
    pub assignment_status: AssignmentStatus,
    pub overall_progress: u8,
}

// -- Notifications & achievements --

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub kind: String,
    pub message: String,
    pub assignment_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AchievementResponse {
    pub id: Uuid,
    pub code: String,
    pub title: String,
    pub earned_at: DateTime<Utc>,
}
