use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::order::OrderKey;

// -- Users --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Moderator,
    Buddy,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::Buddy => "buddy",
            Role::Employee => "employee",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "moderator" => Some(Role::Moderator),
            "buddy" => Some(Role::Buddy),
            "employee" => Some(Role::Employee),
            _ => None,
        }
    }

    /// Moderators and admins manage flow content and assignments.
    pub fn can_moderate(&self) -> bool {
        matches!(self, Role::Admin | Role::Moderator)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

// -- Flows (live editable content) --

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlowSettings {
    /// Steps unlock in rank order; the first step is always accessible.
    pub sequential: bool,
    /// Assignees may pause their own in-progress assignment.
    pub allow_self_pause: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_by: Uuid,
    /// Soft-delete flag for the whole flow; unrelated to version activity.
    pub is_active: bool,
    pub settings: FlowSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStep {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub title: String,
    pub description: String,
    pub rank: OrderKey,
    pub required: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: Uuid,
    pub step_id: Uuid,
    pub title: String,
    pub rank: OrderKey,
    pub required: bool,
    pub payload: ComponentPayload,
    pub created_at: DateTime<Utc>,
}

/// Content of a component. A closed union: every component is exactly one
/// of these, and the variant never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentPayload {
    Article {
        body: String,
        reading_time_minutes: u32,
    },
    Quiz {
        questions: Vec<QuizQuestion>,
        /// Minimum score a submission needs before the component counts
        /// as completed.
        pass_score: u32,
    },
    Task {
        code_word: String,
        case_sensitive: bool,
        score: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub text: String,
    pub options: Vec<QuizOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizOption {
    pub text: String,
    pub correct: bool,
    pub points: u32,
}

impl ComponentPayload {
    /// Construction-time checks; invalid payloads never reach persistence.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ComponentPayload::Article { body, .. } => {
                if body.trim().is_empty() {
                    return Err("article body must not be empty".into());
                }
            }
            ComponentPayload::Quiz { questions, .. } => {
                if questions.is_empty() {
                    return Err("quiz needs at least one question".into());
                }
                for (i, q) in questions.iter().enumerate() {
                    if q.text.trim().is_empty() {
                        return Err(format!("question {} has no text", i + 1));
                    }
                    if q.options.is_empty() {
                        return Err(format!("question {} has no options", i + 1));
                    }
                    if !q.options.iter().any(|o| o.correct) {
                        return Err(format!("question {} has no correct option", i + 1));
                    }
                }
            }
            ComponentPayload::Task { code_word, .. } => {
                if code_word.trim().is_empty() {
                    return Err("task code word must not be empty".into());
                }
            }
        }
        Ok(())
    }

    /// Best score a submission can earn on this component.
    pub fn max_score(&self) -> i64 {
        match self {
            ComponentPayload::Article { .. } => 0,
            ComponentPayload::Quiz { questions, .. } => questions
                .iter()
                .map(|q| {
                    q.options
                        .iter()
                        .filter(|o| o.correct)
                        .map(|o| i64::from(o.points))
                        .sum::<i64>()
                })
                .sum(),
            ComponentPayload::Task { score, .. } => i64::from(*score),
        }
    }
}

/// What an assignee hands in for one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Submission {
    Article {
        time_spent_minutes: Option<u32>,
    },
    /// Selected option indexes, one inner list per question.
    Quiz {
        answers: Vec<Vec<usize>>,
    },
    Task {
        code_word: String,
    },
}

// -- Versioning --

/// One publication of a flow. Immutable content copy; `is_active` is the
/// only field that ever changes after creation, and at most one version
/// per `original_id` holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowVersion {
    pub id: Uuid,
    pub original_id: Uuid,
    pub version: i64,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Snapshots --

/// Frozen deep copy of a flow's structure, taken at assignment time.
/// Self-contained: only traceability ids point back at live rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub id: Uuid,
    pub original_flow_id: Uuid,
    /// Snapshot counter per original flow, independent of publication
    /// version numbers.
    pub version: i64,
    /// Publication version that was active when the copy was taken.
    pub flow_version: Option<i64>,
    pub name: String,
    pub description: String,
    pub settings: FlowSettings,
    pub created_at: DateTime<Utc>,
    pub steps: Vec<StepSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub id: Uuid,
    pub original_step_id: Uuid,
    pub title: String,
    pub description: String,
    pub rank: OrderKey,
    pub required: bool,
    pub components: Vec<ComponentSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    pub id: Uuid,
    pub original_component_id: Uuid,
    pub title: String,
    pub rank: OrderKey,
    pub required: bool,
    pub payload: ComponentPayload,
}

impl FlowSnapshot {
    /// Steps in rank order.
    pub fn ordered_steps(&self) -> Vec<&StepSnapshot> {
        let mut steps: Vec<&StepSnapshot> = self.steps.iter().collect();
        steps.sort_by(|a, b| a.rank.cmp(&b.rank));
        steps
    }

    pub fn total_components_count(&self) -> usize {
        self.steps.iter().map(|s| s.components.len()).sum()
    }
}

// -- Assignments --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    InProgress,
    Paused,
    Completed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::Paused => "paused",
            AssignmentStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<AssignmentStatus> {
        match s {
            "assigned" => Some(AssignmentStatus::Assigned),
            "in_progress" => Some(AssignmentStatus::InProgress),
            "paused" => Some(AssignmentStatus::Paused),
            "completed" => Some(AssignmentStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AssignmentStatus::Completed)
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub flow_id: Uuid,
    pub snapshot_id: Uuid,
    pub buddy_id: Option<Uuid>,
    pub assigned_by: Uuid,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
    pub completion_notes: Option<String>,
    pub final_score: Option<i64>,
    /// Optimistic-concurrency stamp; bumped on every status change.
    pub row_version: i64,
}

impl FlowAssignment {
    /// Overdue is a derived condition, never a stored state.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal()
            && self.status != AssignmentStatus::Paused
            && self.due_date.is_some_and(|due| due < now)
    }
}

// -- Progress (computed views; stored state is per-component only) --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentProgress {
    pub component_snapshot_id: Uuid,
    pub original_component_id: Uuid,
    pub title: String,
    pub required: bool,
    pub is_completed: bool,
    pub attempts_count: i64,
    pub best_score: i64,
    pub last_score: i64,
    pub time_spent_minutes: i64,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepProgress {
    pub step_snapshot_id: Uuid,
    pub original_step_id: Uuid,
    pub title: String,
    pub required: bool,
    /// False only in sequential flows when the preceding step is unfinished.
    pub is_accessible: bool,
    pub is_complete: bool,
    pub completed_components_count: usize,
    pub required_components_count: usize,
    pub components: Vec<ComponentProgress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentProgress {
    pub assignment_id: Uuid,
    pub status: AssignmentStatus,
    /// All required steps are complete (optional steps never block).
    pub is_complete: bool,
    /// Counts over required steps only.
    pub completed_steps_count: usize,
    pub total_steps_count: usize,
    /// Percentage over required steps, integer truncation, clamped to 100.
    pub overall_progress: u8,
    pub steps: Vec<StepProgress>,
}

// -- Notifications --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FlowAssigned,
    FlowCompleted,
    AssignmentOverdue,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::FlowAssigned => "flow_assigned",
            NotificationKind::FlowCompleted => "flow_completed",
            NotificationKind::AssignmentOverdue => "assignment_overdue",
        }
    }

    pub fn parse(s: &str) -> Option<NotificationKind> {
        match s {
            "flow_assigned" => Some(NotificationKind::FlowAssigned),
            "flow_completed" => Some(NotificationKind::FlowCompleted),
            "assignment_overdue" => Some(NotificationKind::AssignmentOverdue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub assignment_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// -- Achievements --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub title: String,
    pub earned_at: DateTime<Utc>,
}
