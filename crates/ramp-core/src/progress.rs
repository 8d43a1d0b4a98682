//! Grading and rollup. Stored `component_progress` rows are the single
//! source of truth; step and flow rollups are computed from them on every
//! read, so there is nothing to drift.

use std::collections::HashMap;

use ramp_db::Database;
use ramp_db::models::{ComponentProgressRow, format_ts, parse_ts_opt};
use ramp_types::models::{
    AssignmentProgress, AssignmentStatus, ComponentPayload, ComponentProgress, FlowSnapshot,
    StepProgress, Submission,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::{assignment, map, snapshot};

#[derive(Debug)]
pub struct SubmitOutcome {
    /// Whether this attempt passed the component.
    pub completed: bool,
    pub score: i64,
    pub best_score: i64,
    pub attempts_count: i64,
    pub assignment_status: AssignmentStatus,
    pub overall_progress: u8,
}

#[derive(Debug)]
struct Grade {
    completed: bool,
    score: i64,
    time_spent_minutes: i64,
}

/// Compute the full progress view for an assignment.
pub fn assignment_progress(db: &Database, assignment_id: Uuid) -> CoreResult<AssignmentProgress> {
    let row = db
        .get_assignment(&assignment_id.to_string())?
        .ok_or_else(|| CoreError::not_found("assignment", assignment_id.to_string()))?;
    let status = AssignmentStatus::parse(&row.status)
        .ok_or_else(|| CoreError::Corrupt(format!("bad assignment status '{}'", row.status)))?;
    let snapshot_id = map::parse_id(&row.snapshot_id)?;

    let snap = match snapshot::get_snapshot(db, snapshot_id) {
        Ok(s) => s,
        // A completed assignment may outlive its snapshot once GC prunes
        // it; the terminal rollup is all that is left to report.
        Err(CoreError::NotFound { .. }) if status.is_terminal() => {
            return Ok(AssignmentProgress {
                assignment_id,
                status,
                is_complete: true,
                completed_steps_count: 0,
                total_steps_count: 0,
                overall_progress: 100,
                steps: vec![],
            });
        }
        Err(e) => return Err(e),
    };

    let progress_rows: HashMap<String, ComponentProgressRow> = db
        .list_component_progress(&assignment_id.to_string())?
        .into_iter()
        .map(|r| (r.component_snapshot_id.clone(), r))
        .collect();

    let steps = build_steps(&snap, &progress_rows);

    let total_steps_count = steps.iter().filter(|s| s.required).count();
    let completed_steps_count = steps.iter().filter(|s| s.required && s.is_complete).count();
    let is_complete = completed_steps_count == total_steps_count;
    let overall_progress = overall_percent(status, completed_steps_count, total_steps_count);

    Ok(AssignmentProgress {
        assignment_id,
        status,
        is_complete,
        completed_steps_count,
        total_steps_count,
        overall_progress,
        steps,
    })
}

/// Hand in one component submission: grade it, record the attempt, and
/// auto-complete the assignment when the last required step falls.
pub fn submit(
    db: &Database,
    assignment_id: Uuid,
    component_snapshot_id: Uuid,
    submission: &Submission,
) -> CoreResult<SubmitOutcome> {
    let view = assignment_progress(db, assignment_id)?;
    if view.status != AssignmentStatus::InProgress {
        return Err(CoreError::Validation(format!(
            "assignment is {}, not in progress",
            view.status
        )));
    }

    let step = view
        .steps
        .iter()
        .find(|s| {
            s.components
                .iter()
                .any(|c| c.component_snapshot_id == component_snapshot_id)
        })
        .ok_or_else(|| {
            CoreError::not_found("component", component_snapshot_id.to_string())
        })?;
    if !step.is_accessible {
        return Err(CoreError::Validation(format!(
            "step \"{}\" is not accessible yet",
            step.title
        )));
    }

    let component_row = db
        .get_component_snapshot(&component_snapshot_id.to_string())?
        .ok_or_else(|| CoreError::not_found("component", component_snapshot_id.to_string()))?;
    let payload = map::parse_payload(&component_row.payload)?;

    let grade = grade(&payload, submission)?;

    let updated = db.record_attempt(
        &assignment_id.to_string(),
        &component_snapshot_id.to_string(),
        grade.completed,
        grade.score,
        grade.time_spent_minutes,
        &format_ts(Utc::now()),
    )?;
    if !updated {
        return Err(CoreError::Corrupt(format!(
            "no progress row for component {component_snapshot_id}"
        )));
    }

    let row = db
        .get_component_progress(
            &assignment_id.to_string(),
            &component_snapshot_id.to_string(),
        )?
        .ok_or_else(|| CoreError::not_found("component", component_snapshot_id.to_string()))?;

    let mut view = assignment_progress(db, assignment_id)?;
    if view.is_complete && view.status == AssignmentStatus::InProgress {
        match assignment::complete(db, assignment_id, None) {
            Ok(_) => {}
            // A racing submission finished the assignment first.
            Err(CoreError::InvalidStateTransition {
                from: AssignmentStatus::Completed,
                ..
            }) => {}
            Err(e) => return Err(e),
        }
        view = assignment_progress(db, assignment_id)?;
    }

    Ok(SubmitOutcome {
        completed: grade.completed,
        score: grade.score,
        best_score: row.best_score,
        attempts_count: row.attempts_count,
        assignment_status: view.status,
        overall_progress: view.overall_progress,
    })
}

fn build_steps(
    snap: &FlowSnapshot,
    progress_rows: &HashMap<String, ComponentProgressRow>,
) -> Vec<StepProgress> {
    let mut steps = Vec::with_capacity(snap.steps.len());
    let mut previous_complete = true;

    for step in snap.ordered_steps() {
        let components: Vec<ComponentProgress> = step
            .components
            .iter()
            .map(|c| {
                let row = progress_rows.get(&c.id.to_string());
                ComponentProgress {
                    component_snapshot_id: c.id,
                    original_component_id: c.original_component_id,
                    title: c.title.clone(),
                    required: c.required,
                    is_completed: row.is_some_and(|r| r.is_completed),
                    attempts_count: row.map_or(0, |r| r.attempts_count),
                    best_score: row.map_or(0, |r| r.best_score),
                    last_score: row.map_or(0, |r| r.last_score),
                    time_spent_minutes: row.map_or(0, |r| r.time_spent_minutes),
                    completed_at: row
                        .and_then(|r| parse_ts_opt(r.completed_at.as_deref())),
                }
            })
            .collect();

        let required_components_count = components.iter().filter(|c| c.required).count();
        let completed_components_count = components
            .iter()
            .filter(|c| c.required && c.is_completed)
            .count();
        // Optional components never block a step.
        let is_complete = completed_components_count == required_components_count;

        // The first step is always accessible; in sequential flows each
        // later step waits for the one before it.
        let is_accessible = !snap.settings.sequential || previous_complete;
        previous_complete = is_complete;

        steps.push(StepProgress {
            step_snapshot_id: step.id,
            original_step_id: step.original_step_id,
            title: step.title.clone(),
            required: step.required,
            is_accessible,
            is_complete,
            completed_components_count,
            required_components_count,
            components,
        });
    }

    steps
}

/// One formula, one place: percentage of required steps completed, integer
/// truncation (1 of 3 is 33), clamped; terminal assignments report 100.
fn overall_percent(status: AssignmentStatus, completed: usize, total: usize) -> u8 {
    if status.is_terminal() || total == 0 {
        return 100;
    }
    ((completed * 100 / total).min(100)) as u8
}

fn grade(payload: &ComponentPayload, submission: &Submission) -> CoreResult<Grade> {
    match (payload, submission) {
        (
            ComponentPayload::Article {
                reading_time_minutes,
                ..
            },
            Submission::Article { time_spent_minutes },
        ) => Ok(Grade {
            completed: true,
            score: 0,
            time_spent_minutes: i64::from(time_spent_minutes.unwrap_or(*reading_time_minutes)),
        }),

        (
            ComponentPayload::Quiz {
                questions,
                pass_score,
            },
            Submission::Quiz { answers },
        ) => {
            if answers.len() != questions.len() {
                return Err(CoreError::Validation(format!(
                    "expected {} answers, got {}",
                    questions.len(),
                    answers.len()
                )));
            }

            let mut score = 0i64;
            for (question, selected) in questions.iter().zip(answers) {
                let mut seen = vec![false; question.options.len()];
                for &index in selected {
                    if index >= question.options.len() {
                        return Err(CoreError::Validation(format!(
                            "option index {index} out of range"
                        )));
                    }
                    if seen[index] {
                        return Err(CoreError::Validation(format!(
                            "duplicate option index {index}"
                        )));
                    }
                    seen[index] = true;
                }

                // A question scores only when the selection matches the
                // correct set exactly.
                let exact = question
                    .options
                    .iter()
                    .enumerate()
                    .all(|(i, option)| option.correct == seen[i]);
                if exact {
                    score += question
                        .options
                        .iter()
                        .filter(|o| o.correct)
                        .map(|o| i64::from(o.points))
                        .sum::<i64>();
                }
            }

            Ok(Grade {
                completed: score >= i64::from(*pass_score),
                score,
                time_spent_minutes: 0,
            })
        }

        (
            ComponentPayload::Task {
                code_word,
                case_sensitive,
                score,
            },
            Submission::Task { code_word: given },
        ) => {
            let given = given.trim();
            let matched = if *case_sensitive {
                given == code_word
            } else {
                given.eq_ignore_ascii_case(code_word)
            };
            Ok(Grade {
                completed: matched,
                score: if matched { i64::from(*score) } else { 0 },
                time_spent_minutes: 0,
            })
        }

        _ => Err(CoreError::Validation(
            "submission type does not match component type".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::{AssignParams, assign_flow, start};
    use crate::content::{self, NewFlow};
    use crate::testutil::{seed_employee, seed_moderator, test_db};
    use ramp_types::models::{QuizOption, QuizQuestion};

    fn article() -> ComponentPayload {
        ComponentPayload::Article {
            body: "read me".into(),
            reading_time_minutes: 2,
        }
    }

    fn quiz(pass_score: u32) -> ComponentPayload {
        ComponentPayload::Quiz {
            questions: vec![
                QuizQuestion {
                    text: "2 + 2?".into(),
                    options: vec![
                        QuizOption {
                            text: "4".into(),
                            correct: true,
                            points: 5,
                        },
                        QuizOption {
                            text: "5".into(),
                            correct: false,
                            points: 0,
                        },
                    ],
                },
                QuizQuestion {
                    text: "Primary colors?".into(),
                    options: vec![
                        QuizOption {
                            text: "Red".into(),
                            correct: true,
                            points: 2,
                        },
                        QuizOption {
                            text: "Blue".into(),
                            correct: true,
                            points: 3,
                        },
                        QuizOption {
                            text: "Green".into(),
                            correct: false,
                            points: 0,
                        },
                    ],
                },
            ],
            pass_score,
        }
    }

    struct Fixture {
        assignment_id: Uuid,
        steps: Vec<Vec<Uuid>>,
    }

    /// Build a flow from (required, components) descriptions, publish,
    /// assign to a fresh employee, start, and hand back component snapshot
    /// ids per step.
    fn fixture(
        db: &Database,
        sequential: bool,
        steps: &[(bool, Vec<(&str, bool, ComponentPayload)>)],
    ) -> Fixture {
        let moderator = seed_moderator(db);
        let employee = seed_employee(db);
        let flow = content::create_flow(
            db,
            NewFlow {
                name: "Fixture flow".into(),
                description: String::new(),
                sequential,
                allow_self_pause: true,
                created_by: moderator,
            },
        )
        .unwrap();

        for (i, (required, components)) in steps.iter().enumerate() {
            let step =
                content::add_step(db, flow.id, &format!("Step {}", i + 1), "", *required, None)
                    .unwrap();
            for (title, required, payload) in components {
                content::add_component(db, step.id, title, *required, payload, None).unwrap();
            }
        }

        crate::versioning::publish_flow(db, flow.id).unwrap();
        let a = assign_flow(
            db,
            AssignParams {
                flow_id: flow.id,
                user_id: employee,
                buddy_id: None,
                assigned_by: moderator,
                due_date: None,
            },
        )
        .unwrap();
        start(db, a.id).unwrap();

        let view = assignment_progress(db, a.id).unwrap();
        let steps = view
            .steps
            .iter()
            .map(|s| {
                s.components
                    .iter()
                    .map(|c| c.component_snapshot_id)
                    .collect()
            })
            .collect();

        Fixture {
            assignment_id: a.id,
            steps,
        }
    }

    fn read_article(db: &Database, f: &Fixture, step: usize, component: usize) {
        submit(
            db,
            f.assignment_id,
            f.steps[step][component],
            &Submission::Article {
                time_spent_minutes: None,
            },
        )
        .unwrap();
    }

    #[test]
    fn optional_steps_do_not_block_completion() {
        // Scenario: 2 required steps + 1 optional; completing the required
        // ones completes the flow.
        let db = test_db();
        let f = fixture(
            &db,
            false,
            &[
                (true, vec![("a", true, article())]),
                (true, vec![("b", true, article())]),
                (false, vec![("c", true, article())]),
            ],
        );

        read_article(&db, &f, 0, 0);
        let mid = assignment_progress(&db, f.assignment_id).unwrap();
        assert!(!mid.is_complete);
        assert_eq!(mid.completed_steps_count, 1);

        read_article(&db, &f, 1, 0);
        let done = assignment_progress(&db, f.assignment_id).unwrap();
        assert!(done.is_complete);
        assert_eq!(done.completed_steps_count, 2);
        assert_eq!(done.total_steps_count, 2);
        assert_eq!(done.status, AssignmentStatus::Completed);
        assert_eq!(done.overall_progress, 100);
    }

    #[test]
    fn one_of_three_steps_is_33_percent() {
        let db = test_db();
        let f = fixture(
            &db,
            false,
            &[
                (true, vec![("a", true, article())]),
                (true, vec![("b", true, article())]),
                (true, vec![("c", true, article())]),
            ],
        );

        read_article(&db, &f, 0, 0);
        let view = assignment_progress(&db, f.assignment_id).unwrap();
        assert_eq!(view.overall_progress, 33);
        assert_eq!(view.completed_steps_count, 1);
        assert_eq!(view.total_steps_count, 3);
    }

    #[test]
    fn sequential_flow_gates_later_steps() {
        let db = test_db();
        let f = fixture(
            &db,
            true,
            &[
                (true, vec![("a", true, article())]),
                (true, vec![("b", true, article())]),
            ],
        );

        let view = assignment_progress(&db, f.assignment_id).unwrap();
        assert!(view.steps[0].is_accessible);
        assert!(!view.steps[1].is_accessible);

        // Submitting into the locked step is refused.
        let err = submit(
            &db,
            f.assignment_id,
            f.steps[1][0],
            &Submission::Article {
                time_spent_minutes: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        read_article(&db, &f, 0, 0);
        let view = assignment_progress(&db, f.assignment_id).unwrap();
        assert!(view.steps[1].is_accessible);
    }

    #[test]
    fn optional_components_do_not_block_a_step() {
        let db = test_db();
        let f = fixture(
            &db,
            false,
            &[(
                true,
                vec![
                    ("must", true, article()),
                    ("extra", false, article()),
                ],
            )],
        );

        read_article(&db, &f, 0, 0);
        let view = assignment_progress(&db, f.assignment_id).unwrap();
        assert!(view.steps[0].is_complete);
        assert_eq!(view.steps[0].completed_components_count, 1);
        assert_eq!(view.steps[0].required_components_count, 1);
    }

    #[test]
    fn quiz_grading_failed_attempts_count() {
        let db = test_db();
        let f = fixture(&db, false, &[(true, vec![("quiz", true, quiz(10))])]);
        let component = f.steps[0][0];

        // Wrong second answer: only question one scores, below pass.
        let attempt = submit(
            &db,
            f.assignment_id,
            component,
            &Submission::Quiz {
                answers: vec![vec![0], vec![0]],
            },
        )
        .unwrap();
        assert!(!attempt.completed);
        assert_eq!(attempt.score, 5);
        assert_eq!(attempt.attempts_count, 1);
        assert_eq!(attempt.best_score, 5);

        // Exact selections on both questions: 5 + 5 = 10, passes.
        let attempt = submit(
            &db,
            f.assignment_id,
            component,
            &Submission::Quiz {
                answers: vec![vec![0], vec![0, 1]],
            },
        )
        .unwrap();
        assert!(attempt.completed);
        assert_eq!(attempt.score, 10);
        assert_eq!(attempt.attempts_count, 2);
        assert_eq!(attempt.best_score, 10);
        assert_eq!(attempt.assignment_status, AssignmentStatus::Completed);
    }

    #[test]
    fn best_score_never_regresses() {
        let db = test_db();
        let f = fixture(&db, false, &[(true, vec![("quiz", true, quiz(1))])]);
        let component = f.steps[0][0];

        let good = submit(
            &db,
            f.assignment_id,
            component,
            &Submission::Quiz {
                answers: vec![vec![0], vec![0, 1]],
            },
        )
        .unwrap();
        assert_eq!(good.best_score, 10);

        // Completed assignments refuse further submissions, so retakes
        // only happen while in progress; regrade through grade() directly.
        let worse = grade(
            &quiz(1),
            &Submission::Quiz {
                answers: vec![vec![1], vec![2]],
            },
        )
        .unwrap();
        assert_eq!(worse.score, 0);
        assert!(!worse.completed);
    }

    #[test]
    fn task_code_word_case_sensitivity() {
        let strict = ComponentPayload::Task {
            code_word: "Apollo".into(),
            case_sensitive: true,
            score: 7,
        };
        let lax = ComponentPayload::Task {
            code_word: "Apollo".into(),
            case_sensitive: false,
            score: 7,
        };

        let wrong = grade(
            &strict,
            &Submission::Task {
                code_word: "apollo".into(),
            },
        )
        .unwrap();
        assert!(!wrong.completed);
        assert_eq!(wrong.score, 0);

        let right = grade(
            &lax,
            &Submission::Task {
                code_word: "  apollo ".into(),
            },
        )
        .unwrap();
        assert!(right.completed);
        assert_eq!(right.score, 7);
    }

    #[test]
    fn mismatched_submission_type_is_rejected() {
        let err = grade(
            &article(),
            &Submission::Task {
                code_word: "nope".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = grade(
            &quiz(1),
            &Submission::Quiz {
                answers: vec![vec![0]],
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn article_time_defaults_to_reading_time() {
        let db = test_db();
        let f = fixture(&db, false, &[(
            true,
            vec![("read", true, article()), ("extra", false, article())],
        )]);

        submit(
            &db,
            f.assignment_id,
            f.steps[0][1],
            &Submission::Article {
                time_spent_minutes: Some(9),
            },
        )
        .unwrap();
        let view = assignment_progress(&db, f.assignment_id).unwrap();
        assert_eq!(view.steps[0].components[1].time_spent_minutes, 9);

        read_article(&db, &f, 0, 0);
        let view = assignment_progress(&db, f.assignment_id).unwrap();
        assert_eq!(view.steps[0].components[0].time_spent_minutes, 2);
    }
}
