// src/handlers/quiz.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::{FromRow, PgPool};

use crate::{
    error::AppError,
    gating,
    models::{
        progress::{QuestionResult, QuizOutcome, SubmitQuizRequest},
        question::Question,
    },
    utils::jwt::Claims,
};

/// Attempt budget per (user, chapter) until an administrative reset.
const MAX_ATTEMPTS: i32 = 2;

/// Existing progress fields the grading engine reads before writing.
#[derive(Debug, FromRow)]
struct ExistingProgress {
    completed: bool,
    score: Option<i32>,
    attempts: i32,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Counts correct answers and computes the rounded percentage score.
fn score_submission(questions: &[Question], answers: &HashMap<i64, i32>) -> (usize, i32) {
    let total = questions.len();
    if total == 0 {
        return (0, 0);
    }

    let correct = questions
        .iter()
        .filter(|q| answers.get(&q.id) == Some(&q.correct_index))
        .count();

    let score = (100.0 * correct as f64 / total as f64).round() as i32;
    (correct, score)
}

/// Whether a new attempt may be accepted. Completed chapters accept
/// resubmission idempotently; otherwise the budget applies.
fn attempt_allowed(attempts: i32, completed: bool) -> bool {
    completed || attempts < MAX_ATTEMPTS
}

/// Submits a quiz for one chapter and grades it server-side.
///
/// * Rejects incomplete answer sets before any write.
/// * Enforces the two-attempt budget unless the chapter is already completed.
/// * Appends to the quiz_attempts log, upserts user_progress without ever
///   downgrading a completed chapter, and unlocks the next chapter on pass.
pub async fn submit_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<i64>,
    Json(req): Json<SubmitQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let chapter = sqlx::query_as::<_, (i64, i32)>(
        "SELECT module_id, order_index FROM chapters WHERE id = $1",
    )
    .bind(chapter_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Chapter not found".to_string()))?;
    let (module_id, order_index) = chapter;

    gating::ensure_module_unlocked(&pool, user_id, module_id).await?;

    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, chapter_id, prompt, options, correct_index, explanation, created_at
        FROM questions
        WHERE chapter_id = $1
        ORDER BY id
        "#,
    )
    .bind(chapter_id)
    .fetch_all(&pool)
    .await?;

    if questions.is_empty() {
        return Err(AppError::BadRequest(
            "This chapter has no quiz".to_string(),
        ));
    }

    // Validation error, rejected before any write.
    if questions.iter().any(|q| !req.answers.contains_key(&q.id)) {
        return Err(AppError::BadRequest(
            "All questions must be answered before submitting.".to_string(),
        ));
    }

    let required_score: i32 =
        sqlx::query_scalar("SELECT required_score FROM modules WHERE id = $1")
            .bind(module_id)
            .fetch_one(&pool)
            .await?;

    let existing = sqlx::query_as::<_, ExistingProgress>(
        r#"
        SELECT completed, score, attempts, completed_at
        FROM user_progress
        WHERE user_id = $1 AND chapter_id = $2
        "#,
    )
    .bind(user_id)
    .bind(chapter_id)
    .fetch_optional(&pool)
    .await?;

    let prior_completed = existing.as_ref().map(|p| p.completed).unwrap_or(false);
    let prior_attempts = existing.as_ref().map(|p| p.attempts).unwrap_or(0);

    if !attempt_allowed(prior_attempts, prior_completed) {
        return Err(AppError::AttemptsExhausted);
    }

    let (correct_count, score) = score_submission(&questions, &req.answers);
    let passed = score >= required_score;
    let attempt_number = prior_attempts + 1;

    // Append to the attempt log first; attempt_number stays strictly
    // increasing per (user, chapter).
    sqlx::query(
        r#"
        INSERT INTO quiz_attempts (user_id, chapter_id, answers, score, passed, attempt_number)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(user_id)
    .bind(chapter_id)
    .bind(serde_json::to_value(&req.answers)?)
    .bind(score)
    .bind(passed)
    .bind(attempt_number)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to record quiz attempt: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    // Never downgrade a completed chapter: a later failed retake only moves
    // the attempt counter.
    let now = chrono::Utc::now();
    let (new_completed, new_score, new_completed_at) = if prior_completed {
        let prior_score = existing.as_ref().and_then(|p| p.score);
        let kept_score = if passed {
            Some(prior_score.unwrap_or(0).max(score))
        } else {
            prior_score
        };
        (true, kept_score, existing.as_ref().and_then(|p| p.completed_at))
    } else if passed {
        (true, Some(score), Some(now))
    } else {
        (false, Some(score), None)
    };

    sqlx::query(
        r#"
        INSERT INTO user_progress (user_id, module_id, chapter_id, completed, score, attempts, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (user_id, chapter_id) DO UPDATE SET
            completed = EXCLUDED.completed,
            score = EXCLUDED.score,
            attempts = EXCLUDED.attempts,
            completed_at = EXCLUDED.completed_at
        "#,
    )
    .bind(user_id)
    .bind(module_id)
    .bind(chapter_id)
    .bind(new_completed)
    .bind(new_score)
    .bind(attempt_number)
    .bind(new_completed_at)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to upsert progress: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if passed {
        unlock_next_chapter(&pool, user_id, module_id, order_index).await?;
    }

    let results: Vec<QuestionResult> = questions
        .iter()
        .map(|q| QuestionResult {
            question_id: q.id,
            correct: req.answers.get(&q.id) == Some(&q.correct_index),
            explanation: q.explanation.clone(),
        })
        .collect();

    Ok(Json(QuizOutcome {
        score,
        passed,
        correct_count,
        total_questions: questions.len(),
        attempts_remaining: (MAX_ATTEMPTS - attempt_number).max(0),
        results,
    }))
}

/// Unlocks the chapter following the given one within the same module, if
/// any, by writing a fresh progress row with unlocked_at set. An existing
/// row is left untouched.
async fn unlock_next_chapter(
    pool: &PgPool,
    user_id: i64,
    module_id: i64,
    order_index: i32,
) -> Result<(), AppError> {
    let next_chapter: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM chapters WHERE module_id = $1 AND order_index = $2",
    )
    .bind(module_id)
    .bind(order_index + 1)
    .fetch_optional(pool)
    .await?;

    if let Some(next_id) = next_chapter {
        sqlx::query(
            r#"
            INSERT INTO user_progress (user_id, module_id, chapter_id, unlocked_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, chapter_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(module_id)
        .bind(next_id)
        .execute(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to unlock next chapter: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;

    fn question(id: i64, correct_index: i32) -> Question {
        Question {
            id,
            chapter_id: 1,
            prompt: format!("Question {}", id),
            options: Json(vec!["A".into(), "B".into(), "C".into(), "D".into()]),
            correct_index,
            explanation: None,
            created_at: None,
        }
    }

    #[test]
    fn three_of_four_correct_scores_seventy_five() {
        let questions = vec![question(1, 0), question(2, 1), question(3, 2), question(4, 3)];
        let answers = HashMap::from([(1, 0), (2, 1), (3, 2), (4, 0)]);

        let (correct, score) = score_submission(&questions, &answers);
        assert_eq!(correct, 3);
        assert_eq!(score, 75);
        assert!(score >= 75, "75 must clear the default threshold");
    }

    #[test]
    fn perfect_and_zero_scores() {
        let questions = vec![question(1, 0), question(2, 1)];

        let all_right = HashMap::from([(1, 0), (2, 1)]);
        assert_eq!(score_submission(&questions, &all_right), (2, 100));

        let all_wrong = HashMap::from([(1, 3), (2, 3)]);
        assert_eq!(score_submission(&questions, &all_wrong), (0, 0));
    }

    #[test]
    fn score_is_rounded_to_nearest_percent() {
        let questions = vec![question(1, 0), question(2, 0), question(3, 0)];
        let answers = HashMap::from([(1, 0), (2, 0), (3, 1)]);

        // 2/3 = 66.66... rounds to 67.
        assert_eq!(score_submission(&questions, &answers), (2, 67));
    }

    #[test]
    fn empty_question_set_scores_zero() {
        assert_eq!(score_submission(&[], &HashMap::new()), (0, 0));
    }

    #[test]
    fn attempt_budget_blocks_third_try_until_completed() {
        assert!(attempt_allowed(0, false));
        assert!(attempt_allowed(1, false));
        assert!(!attempt_allowed(2, false));

        // A completed chapter accepts resubmission regardless of the count.
        assert!(attempt_allowed(2, true));
    }
}
