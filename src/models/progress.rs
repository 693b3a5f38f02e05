// src/models/progress.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::collections::HashMap;
use validator::Validate;

/// Represents the 'user_progress' table in the database.
///
/// At most one record exists per (user, chapter). Rows are created on the
/// first quiz submission or activity autosave and are never deleted:
/// administrative resets zero out attempts/score/completed in place.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: i64,
    pub user_id: i64,
    pub module_id: i64,
    pub chapter_id: i64,
    pub completed: bool,
    pub score: Option<i32>,
    pub attempts: i32,
    pub unlocked_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Activity metadata blob: `{ "step": n, "responses": { ... } }`.
    /// Overwritten wholesale on every save; last writer wins. Two concurrent
    /// saves for the same (user, chapter) race with no version check.
    pub metadata: Option<Value>,
}

/// Represents the append-only 'quiz_attempts' log.
/// attempt_number is strictly increasing per (user, chapter) and capped at
/// two attempts until an administrative reset.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub user_id: i64,
    pub chapter_id: i64,
    pub answers: Value,
    pub score: i32,
    pub passed: bool,
    pub attempt_number: i32,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for submitting a quiz: question id -> chosen option index.
#[derive(Debug, Deserialize)]
pub struct SubmitQuizRequest {
    pub answers: HashMap<i64, i32>,
}

/// Per-question verdict returned after a submission.
#[derive(Debug, Serialize)]
pub struct QuestionResult {
    pub question_id: i64,
    pub correct: bool,
    pub explanation: Option<String>,
}

/// DTO returned by the quiz grading engine.
#[derive(Debug, Serialize)]
pub struct QuizOutcome {
    pub score: i32,
    pub passed: bool,
    pub correct_count: usize,
    pub total_questions: usize,
    pub attempts_remaining: i32,
    pub results: Vec<QuestionResult>,
}

/// The activity metadata blob as stored in `user_progress.metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityState {
    pub step: i32,
    pub responses: Value,
}

impl ActivityState {
    /// Parses a stored metadata blob. Returns None when the blob is absent
    /// or does not have the `{step, responses}` shape.
    pub fn from_metadata(metadata: Option<&Value>) -> Option<ActivityState> {
        metadata.and_then(|m| serde_json::from_value(m.clone()).ok())
    }

    pub fn status(&self) -> ActivityStatus {
        ActivityStatus::of(&self.responses)
    }
}

/// DTO for saving activity progress (whole-blob replacement).
#[derive(Debug, Deserialize, Validate)]
pub struct SaveActivityRequest {
    #[validate(range(min = 0))]
    pub step: i32,
    pub responses: Value,
}

/// Review state of a free-text submission, stored as the distinguished
/// `status` field inside the responses object.
///
/// Transitions are monotonic: pending -> submitted -> {passed, failed}.
/// Only an administrative rollback returns a record to pending, and it
/// preserves the response content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Pending,
    Submitted,
    Passed,
    Failed,
}

impl ActivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Pending => "pending",
            ActivityStatus::Submitted => "submitted",
            ActivityStatus::Passed => "passed",
            ActivityStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<ActivityStatus> {
        match s {
            "pending" => Some(ActivityStatus::Pending),
            "submitted" => Some(ActivityStatus::Submitted),
            "passed" => Some(ActivityStatus::Passed),
            "failed" => Some(ActivityStatus::Failed),
            _ => None,
        }
    }

    /// Reads the status out of a responses object. A missing or malformed
    /// field means the work has not been submitted yet.
    pub fn of(responses: &Value) -> ActivityStatus {
        responses
            .get("status")
            .and_then(Value::as_str)
            .and_then(ActivityStatus::parse)
            .unwrap_or(ActivityStatus::Pending)
    }

    /// Forward transitions available to the owner of the state machine:
    /// the student submits, the administrator passes or fails.
    pub fn can_advance_to(self, next: ActivityStatus) -> bool {
        matches!(
            (self, next),
            (ActivityStatus::Pending, ActivityStatus::Submitted)
                | (ActivityStatus::Submitted, ActivityStatus::Passed)
                | (ActivityStatus::Submitted, ActivityStatus::Failed)
        )
    }

    /// The out-of-band administrative transition back to pending.
    pub fn can_rollback(self) -> bool {
        !matches!(self, ActivityStatus::Pending)
    }
}

/// Writes the status field into a responses object in place.
pub fn write_status(responses: &mut Value, status: ActivityStatus) {
    if let Some(obj) = responses.as_object_mut() {
        obj.insert("status".to_string(), Value::String(status.as_str().to_string()));
    }
}
