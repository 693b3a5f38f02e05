// src/handlers/progress.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use sqlx::PgPool;

use crate::{error::AppError, gating, models::progress::ProgressRecord, utils::jwt::Claims};

/// Returns the student's full progress picture: every progress record, the
/// per-module gating verdict, the overall completion percentage and the
/// certificate status (full vs. conditional vs. in progress).
pub async fn get_my_progress(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let records = sqlx::query_as::<_, ProgressRecord>(
        r#"
        SELECT id, user_id, module_id, chapter_id, completed, score, attempts,
               unlocked_at, completed_at, metadata
        FROM user_progress
        WHERE user_id = $1
        ORDER BY module_id, chapter_id
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load progress: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let access = gating::module_access_for(&pool, user_id).await?;
    let certificate = gating::certificate_status(&access);

    let total_chapters: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chapters")
        .fetch_one(&pool)
        .await?;

    let completed_chapters = records.iter().filter(|r| r.completed).count();
    let overall_percent = if total_chapters > 0 {
        ((100.0 * completed_chapters as f64 / total_chapters as f64).round() as i64).min(100)
    } else {
        0
    };

    Ok(Json(serde_json::json!({
        "records": records,
        "modules": access,
        "overall_percent": overall_percent,
        "certificate": certificate,
    })))
}
