// src/handlers/activity.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::{Value, json};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    gating,
    models::progress::{ActivityState, ActivityStatus, SaveActivityRequest, write_status},
    utils::jwt::Claims,
};

/// Saves a student's position within a multi-section exercise.
///
/// The metadata blob is replaced wholesale on every call: last writer wins
/// per (user, chapter), with no merge and no version check. Two tabs
/// autosaving concurrently can overwrite each other; that hazard is part of
/// the store's contract. Debouncing is the caller's policy.
pub async fn save_activity(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<i64>,
    Json(payload): Json<SaveActivityRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;

    let module_id: i64 = sqlx::query_scalar("SELECT module_id FROM chapters WHERE id = $1")
        .bind(chapter_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Chapter not found".to_string()))?;

    gating::ensure_module_unlocked(&pool, user_id, module_id).await?;

    // Once the work has been submitted the record is read-only for the
    // student until an administrator rolls it back.
    let current = load_metadata(&pool, user_id, chapter_id).await?;
    if let Some(state) = ActivityState::from_metadata(current.as_ref()) {
        if state.status() != ActivityStatus::Pending {
            return Err(AppError::Forbidden(
                "This work has been submitted and can no longer be edited.".to_string(),
            ));
        }
    }

    // A student save can never set a review status on its own.
    let mut responses = payload.responses;
    write_status(&mut responses, ActivityStatus::Pending);

    sqlx::query(
        r#"
        INSERT INTO user_progress (user_id, module_id, chapter_id, metadata)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, chapter_id) DO UPDATE SET metadata = EXCLUDED.metadata
        "#,
    )
    .bind(user_id)
    .bind(module_id)
    .bind(chapter_id)
    .bind(json!({ "step": payload.step, "responses": responses }))
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to save activity progress: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(json!({ "success": true })))
}

/// Returns the last saved `{step, responses}` blob, or null when the
/// student has not started. Exactly what was saved comes back; nothing is
/// merged or dropped.
pub async fn get_activity(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let metadata = load_metadata(&pool, user_id, chapter_id).await?;

    Ok(Json(metadata))
}

/// Transitions the student's work from pending to submitted.
/// From then on the record waits for an administrator's verdict.
pub async fn submit_activity(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let metadata = load_metadata(&pool, user_id, chapter_id).await?;

    let mut state = ActivityState::from_metadata(metadata.as_ref()).ok_or(
        AppError::BadRequest("No saved work to submit for this chapter".to_string()),
    )?;

    if !state.status().can_advance_to(ActivityStatus::Submitted) {
        return Err(AppError::Conflict(
            "This work has already been submitted.".to_string(),
        ));
    }

    if !state.responses.is_object() {
        return Err(AppError::BadRequest(
            "Saved responses are malformed and cannot be submitted".to_string(),
        ));
    }

    write_status(&mut state.responses, ActivityStatus::Submitted);
    if let Some(obj) = state.responses.as_object_mut() {
        obj.insert(
            "submitted_at".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
    }

    sqlx::query(
        r#"
        UPDATE user_progress
        SET metadata = $3
        WHERE user_id = $1 AND chapter_id = $2
        "#,
    )
    .bind(user_id)
    .bind(chapter_id)
    .bind(json!({ "step": state.step, "responses": state.responses }))
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to submit activity: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(json!({ "success": true, "status": "submitted" })))
}

async fn load_metadata(
    pool: &PgPool,
    user_id: i64,
    chapter_id: i64,
) -> Result<Option<Value>, AppError> {
    let metadata: Option<Option<Value>> = sqlx::query_scalar(
        "SELECT metadata FROM user_progress WHERE user_id = $1 AND chapter_id = $2",
    )
    .bind(user_id)
    .bind(chapter_id)
    .fetch_optional(pool)
    .await?;

    Ok(metadata.flatten())
}
