// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    grader::SuggestScorer,
    models::{
        chapter::CreateChapterRequest,
        module::CreateModuleRequest,
        progress::{ActivityState, ActivityStatus, ProgressRecord, write_status},
        question::CreateQuestionRequest,
        user::User,
    },
    state::AppState,
    utils::{hash::hash_password, html::clean_html, jwt::Claims},
};

/// Score written by a forced unlock, regardless of actual submission state.
const FORCED_UNLOCK_SCORE: i32 = 100;

/// One student with all of their progress rows, as shown on the admin
/// dashboard. Assembled in Rust from two flat queries.
#[derive(Debug, Serialize)]
pub struct StudentProgress {
    #[serde(flatten)]
    pub user: User,
    pub user_progress: Vec<ProgressRecord>,
}

/// Lists every student together with their progress records and activity
/// metadata. Administrators are excluded from the listing.
pub async fn list_students(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let students = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, password, full_name, role, conditional_access, created_at
        FROM users
        WHERE role = 'student'
        ORDER BY id
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list students: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let mut progress = sqlx::query_as::<_, ProgressRecord>(
        r#"
        SELECT id, user_id, module_id, chapter_id, completed, score, attempts,
               unlocked_at, completed_at, metadata
        FROM user_progress
        ORDER BY user_id, module_id, chapter_id
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load progress for students: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let result: Vec<StudentProgress> = students
        .into_iter()
        .map(|user| {
            let (mine, rest): (Vec<_>, Vec<_>) =
                progress.drain(..).partition(|p| p.user_id == user.id);
            progress = rest;
            StudentProgress {
                user,
                user_progress: mine,
            }
        })
        .collect();

    Ok(Json(result))
}

/// DTO for Admin creating an account (can specify role).
#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreateUserRequest {
    #[validate(email(message = "A valid email address is required."))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password length must be between 8 and 128 characters."))]
    pub password: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub full_name: String,
    pub role: String, // 'student' or 'admin'
}

/// Creates a new account with a specific role.
/// Admin only.
pub async fn create_user(
    State(pool): State<PgPool>,
    Json(payload): Json<AdminCreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.role != "student" && payload.role != "admin" {
        return Err(AppError::BadRequest(
            "Role must be 'student' or 'admin'".to_string(),
        ));
    }

    let hashed_password = hash_password(&payload.password)?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (email, password, full_name, role)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(payload.email.to_lowercase())
    .bind(hashed_password)
    .bind(&payload.full_name)
    .bind(&payload.role)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!("Email '{}' is already registered", payload.email))
        } else {
            tracing::error!("Failed to create user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// DTO for committing a review verdict.
#[derive(Debug, Deserialize, Validate)]
pub struct GradeSubmissionRequest {
    /// 'passed' or 'failed'.
    pub verdict: String,
    #[validate(range(min = 0, max = 100))]
    pub score: i32,
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub feedback: String,
}

/// Commits a grading verdict on a submitted activity.
///
/// Writes status/score/feedback into the metadata blob. When the verdict is
/// 'passed', the chapter's progress row is additionally marked completed so
/// the gating evaluator unlocks the next module.
pub async fn review_submission(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((user_id, chapter_id)): Path<(i64, i64)>,
    Json(payload): Json<GradeSubmissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let target = match payload.verdict.as_str() {
        "passed" => ActivityStatus::Passed,
        "failed" => ActivityStatus::Failed,
        _ => {
            return Err(AppError::BadRequest(
                "Verdict must be 'passed' or 'failed'".to_string(),
            ));
        }
    };

    let mut state = load_activity_state(&pool, user_id, chapter_id).await?;

    if !state.status().can_advance_to(target) {
        return Err(AppError::Conflict(
            "Only work in 'submitted' state can be graded.".to_string(),
        ));
    }

    write_status(&mut state.responses, target);
    if let Some(obj) = state.responses.as_object_mut() {
        obj.insert("score".to_string(), Value::from(payload.score));
        obj.insert(
            "feedback".to_string(),
            Value::String(clean_html(&payload.feedback)),
        );
        obj.insert(
            "reviewed_at".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
    }

    let metadata = serde_json::json!({ "step": state.step, "responses": state.responses });

    let result = if target == ActivityStatus::Passed {
        sqlx::query(
            r#"
            UPDATE user_progress
            SET metadata = $3,
                completed = TRUE,
                score = $4,
                completed_at = COALESCE(completed_at, NOW())
            WHERE user_id = $1 AND chapter_id = $2
            "#,
        )
        .bind(user_id)
        .bind(chapter_id)
        .bind(&metadata)
        .bind(payload.score)
        .execute(&pool)
        .await
    } else {
        sqlx::query(
            "UPDATE user_progress SET metadata = $3 WHERE user_id = $1 AND chapter_id = $2",
        )
        .bind(user_id)
        .bind(chapter_id)
        .bind(&metadata)
        .execute(&pool)
        .await
    };

    result.map_err(|e| {
        tracing::error!("Failed to commit review: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(
        admin = %claims.sub,
        student = user_id,
        chapter = chapter_id,
        verdict = %payload.verdict,
        score = payload.score,
        "Review committed"
    );

    Ok(Json(serde_json::json!({
        "status": target.as_str(),
        "score": payload.score,
    })))
}

/// Rolls a reviewed or submitted activity back to pending, preserving all
/// response content so the student may resubmit.
pub async fn rollback_submission(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((user_id, chapter_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let mut state = load_activity_state(&pool, user_id, chapter_id).await?;

    if !state.status().can_rollback() {
        return Err(AppError::Conflict(
            "This work is still pending; there is nothing to roll back.".to_string(),
        ));
    }

    // Status goes back to pending; responses, scores and feedback stay.
    // The progress row's `completed` flag is deliberately untouched.
    write_status(&mut state.responses, ActivityStatus::Pending);

    sqlx::query("UPDATE user_progress SET metadata = $3 WHERE user_id = $1 AND chapter_id = $2")
        .bind(user_id)
        .bind(chapter_id)
        .bind(serde_json::json!({ "step": state.step, "responses": state.responses }))
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to roll back submission: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    tracing::info!(
        admin = %claims.sub,
        student = user_id,
        chapter = chapter_id,
        "Submission rolled back to pending"
    );

    Ok(Json(serde_json::json!({ "status": "pending" })))
}

/// DTO for the administrative override endpoints. The caller must confirm
/// explicitly; overrides are never committed on a bare request.
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub confirm: bool,
}

/// Zeroes out attempts/score/completed for one chapter so the student may
/// retry. Bypasses the normal state machine; logged as an override.
pub async fn reset_attempts(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((user_id, chapter_id)): Path<(i64, i64)>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !payload.confirm {
        return Err(AppError::BadRequest(
            "Explicit confirmation is required for an attempt reset.".to_string(),
        ));
    }

    let module_id = module_of_chapter(&pool, chapter_id).await?;

    sqlx::query(
        r#"
        INSERT INTO user_progress (user_id, module_id, chapter_id, attempts, completed, score)
        VALUES ($1, $2, $3, 0, FALSE, NULL)
        ON CONFLICT (user_id, chapter_id) DO UPDATE SET
            attempts = 0,
            completed = FALSE,
            score = NULL
        "#,
    )
    .bind(user_id)
    .bind(module_id)
    .bind(chapter_id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to reset attempts: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::warn!(
        admin = %claims.sub,
        student = user_id,
        chapter = chapter_id,
        "Administrative override: attempts reset"
    );

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Marks a gate chapter completed with a fixed score regardless of actual
/// submission state. The student's quiz attempts and activity responses are
/// left untouched. Bypasses the normal state machine; logged as an override.
pub async fn force_unlock(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((user_id, chapter_id)): Path<(i64, i64)>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !payload.confirm {
        return Err(AppError::BadRequest(
            "Explicit confirmation is required for a forced unlock.".to_string(),
        ));
    }

    let module_id = module_of_chapter(&pool, chapter_id).await?;

    sqlx::query(
        r#"
        INSERT INTO user_progress (user_id, module_id, chapter_id, completed, score, completed_at)
        VALUES ($1, $2, $3, TRUE, $4, NOW())
        ON CONFLICT (user_id, chapter_id) DO UPDATE SET
            completed = TRUE,
            score = EXCLUDED.score,
            completed_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(module_id)
    .bind(chapter_id)
    .bind(FORCED_UNLOCK_SCORE)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to force unlock: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::warn!(
        admin = %claims.sub,
        student = user_id,
        chapter = chapter_id,
        "Administrative override: gate chapter force-unlocked"
    );

    Ok(Json(serde_json::json!({ "success": true })))
}

/// DTO for granting or revoking conditional access.
#[derive(Debug, Deserialize)]
pub struct ConditionalAccessRequest {
    pub enabled: bool,
    #[serde(default)]
    pub confirm: bool,
}

/// Grants or revokes conditional access: the student may proceed past a
/// failed gate module, and their certificate becomes conditional.
pub async fn set_conditional_access(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
    Json(payload): Json<ConditionalAccessRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !payload.confirm {
        return Err(AppError::BadRequest(
            "Explicit confirmation is required to change conditional access.".to_string(),
        ));
    }

    let result = sqlx::query("UPDATE users SET conditional_access = $2 WHERE id = $1")
        .bind(user_id)
        .bind(payload.enabled)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update conditional access: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::warn!(
        admin = %claims.sub,
        student = user_id,
        enabled = payload.enabled,
        "Administrative override: conditional access changed"
    );

    Ok(Json(serde_json::json!({ "conditional_access": payload.enabled })))
}

/// DTO for requesting an advisory grade suggestion.
#[derive(Debug, Deserialize)]
pub struct SuggestGradeRequest {
    pub user_id: i64,
    pub chapter_id: i64,
}

/// Asks the external text-generation service for an advisory
/// `{score, feedback}` suggestion on a student's responses.
///
/// Purely advisory: nothing is written, and the review workflow works
/// identically when the service is unconfigured or unreachable.
pub async fn suggest_grade(
    State(state): State<AppState>,
    Json(payload): Json<SuggestGradeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let activity =
        load_activity_state(&state.pool, payload.user_id, payload.chapter_id).await?;

    let grader = state.grader.as_ref().ok_or(AppError::ServiceUnavailable(
        "Grading suggestions are not configured".to_string(),
    ))?;

    let suggestion = grader.suggest(&activity.responses).await?;

    Ok(Json(suggestion))
}

/// Creates a module registry entry.
/// Admin only.
pub async fn create_module(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateModuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO modules (slug, title, description, position, required_score, gate_chapter_id, min_completed_chapters)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(&payload.slug)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.position)
    .bind(payload.required_score)
    .bind(payload.gate_chapter_id)
    .bind(payload.min_completed_chapters)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!(
                "A module with slug '{}' or position {} already exists",
                payload.slug, payload.position
            ))
        } else {
            tracing::error!("Failed to create module: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// DTO for updating a module registry entry. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateModuleRequest {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub position: Option<i32>,
    pub required_score: Option<i32>,
    pub gate_chapter_id: Option<i64>,
    pub min_completed_chapters: Option<i32>,
}

/// Updates a module registry entry by ID.
/// Admin only.
pub async fn update_module(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateModuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.slug.is_none()
        && payload.title.is_none()
        && payload.description.is_none()
        && payload.position.is_none()
        && payload.required_score.is_none()
        && payload.gate_chapter_id.is_none()
        && payload.min_completed_chapters.is_none()
    {
        return Ok(StatusCode::OK);
    }

    if let Some(score) = payload.required_score {
        if !(0..=100).contains(&score) {
            return Err(AppError::BadRequest(
                "required_score must be between 0 and 100".to_string(),
            ));
        }
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE modules SET ");
    let mut separated = builder.separated(", ");

    if let Some(slug) = payload.slug {
        separated.push("slug = ");
        separated.push_bind_unseparated(slug);
    }

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }

    if let Some(position) = payload.position {
        separated.push("position = ");
        separated.push_bind_unseparated(position);
    }

    if let Some(required_score) = payload.required_score {
        separated.push("required_score = ");
        separated.push_bind_unseparated(required_score);
    }

    if let Some(gate_chapter_id) = payload.gate_chapter_id {
        separated.push("gate_chapter_id = ");
        separated.push_bind_unseparated(gate_chapter_id);
    }

    if let Some(min_completed) = payload.min_completed_chapters {
        separated.push("min_completed_chapters = ");
        separated.push_bind_unseparated(min_completed);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update module: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Module not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a module registry entry by ID.
/// Admin only.
pub async fn delete_module(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM modules WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete module: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Module not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Creates a new chapter. The body is sanitized before storage.
/// Admin only.
pub async fn create_chapter(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateChapterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO chapters (module_id, title, content, order_index)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(payload.module_id)
    .bind(&payload.title)
    .bind(clean_html(&payload.content))
    .bind(payload.order_index)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        let msg = e.to_string();
        if msg.contains("unique constraint") || msg.contains("23505") {
            AppError::Conflict(format!(
                "Order index {} is already taken in this module",
                payload.order_index
            ))
        } else if msg.contains("foreign key") || msg.contains("23503") {
            AppError::BadRequest("Module does not exist".to_string())
        } else {
            tracing::error!("Failed to create chapter: {:?}", e);
            AppError::InternalServerError(msg)
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// DTO for updating a chapter. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateChapterRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub order_index: Option<i32>,
}

/// Updates a chapter by ID.
/// Admin only.
pub async fn update_chapter(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateChapterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.title.is_none() && payload.content.is_none() && payload.order_index.is_none() {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE chapters SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(content) = payload.content {
        separated.push("content = ");
        separated.push_bind_unseparated(clean_html(&content));
    }

    if let Some(order_index) = payload.order_index {
        separated.push("order_index = ");
        separated.push_bind_unseparated(order_index);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update chapter: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Chapter not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a chapter by ID.
/// Admin only.
pub async fn delete_chapter(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM chapters WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete chapter: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Chapter not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Creates a new quiz question.
/// Admin only.
pub async fn create_question(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.correct_index as usize >= payload.options.len() {
        return Err(AppError::BadRequest(
            "correct_index must point at one of the options".to_string(),
        ));
    }

    let options_json = serde_json::to_value(&payload.options).unwrap_or_default();

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (chapter_id, prompt, options, correct_index, explanation)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(payload.chapter_id)
    .bind(&payload.prompt)
    .bind(options_json)
    .bind(payload.correct_index)
    .bind(&payload.explanation)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        let msg = e.to_string();
        if msg.contains("foreign key") || msg.contains("23503") {
            AppError::BadRequest("Chapter does not exist".to_string())
        } else {
            tracing::error!("Failed to create question: {:?}", e);
            AppError::InternalServerError(msg)
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub prompt: Option<String>,
    pub options: Option<Vec<String>>,
    pub correct_index: Option<i32>,
    pub explanation: Option<String>,
}

/// Updates a question by ID.
/// Admin only.
pub async fn update_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.prompt.is_none()
        && payload.options.is_none()
        && payload.correct_index.is_none()
        && payload.explanation.is_none()
    {
        return Ok(StatusCode::OK);
    }

    if let (Some(options), Some(correct_index)) = (&payload.options, payload.correct_index) {
        if correct_index as usize >= options.len() {
            return Err(AppError::BadRequest(
                "correct_index must point at one of the options".to_string(),
            ));
        }
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    if let Some(prompt) = payload.prompt {
        separated.push("prompt = ");
        separated.push_bind_unseparated(prompt);
    }

    if let Some(options) = payload.options {
        separated.push("options = ");
        separated.push_bind_unseparated(serde_json::to_value(options).unwrap_or_default());
    }

    if let Some(correct_index) = payload.correct_index {
        separated.push("correct_index = ");
        separated.push_bind_unseparated(correct_index);
    }

    if let Some(explanation) = payload.explanation {
        separated.push("explanation = ");
        separated.push_bind_unseparated(explanation);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a quiz question by ID.
/// Admin only.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Loads the activity state for (user, chapter), or 404 when the student
/// has no saved work there.
async fn load_activity_state(
    pool: &PgPool,
    user_id: i64,
    chapter_id: i64,
) -> Result<ActivityState, AppError> {
    let metadata: Option<Option<Value>> = sqlx::query_scalar(
        "SELECT metadata FROM user_progress WHERE user_id = $1 AND chapter_id = $2",
    )
    .bind(user_id)
    .bind(chapter_id)
    .fetch_optional(pool)
    .await?;

    ActivityState::from_metadata(metadata.flatten().as_ref()).ok_or(AppError::NotFound(
        "No submission found for this chapter".to_string(),
    ))
}

async fn module_of_chapter(pool: &PgPool, chapter_id: i64) -> Result<i64, AppError> {
    sqlx::query_scalar("SELECT module_id FROM chapters WHERE id = $1")
        .bind(chapter_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Chapter not found".to_string()))
}
