// src/handlers/catalog.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    gating,
    models::{
        chapter::{Chapter, ChapterSummary},
        module::{Module, ModuleOverview},
        question::{PublicQuestion, Question},
    },
    utils::jwt::Claims,
};

/// Lists the module registry with the student's gating verdict per module.
/// The presentation layer uses `locked` to gray out module entry points.
pub async fn list_modules(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let modules = sqlx::query_as::<_, Module>(
        r#"
        SELECT id, slug, title, description, position, required_score,
               gate_chapter_id, min_completed_chapters, created_at
        FROM modules
        ORDER BY position
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list modules: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let access = gating::module_access_for(&pool, user_id).await?;

    let overview: Vec<ModuleOverview> = modules
        .into_iter()
        .map(|m| {
            let verdict = access.iter().find(|a| a.module_id == m.id);
            ModuleOverview {
                id: m.id,
                slug: m.slug,
                title: m.title,
                description: m.description,
                position: m.position,
                required_score: m.required_score,
                // Fail closed: a module missing from the evaluation is locked.
                locked: verdict.map(|a| a.locked).unwrap_or(true),
                satisfied: verdict.map(|a| a.satisfied).unwrap_or(false),
                conditional: verdict.map(|a| a.conditional).unwrap_or(false),
            }
        })
        .collect();

    Ok(Json(overview))
}

/// Lists the chapters of a module, resolved by slug.
/// Locked modules are refused, even when single chapters inside them
/// already carry progress rows.
pub async fn list_module_chapters(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let module_id: i64 = sqlx::query_scalar("SELECT id FROM modules WHERE slug = $1")
        .bind(&slug)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound(format!("Module '{}' not found", slug)))?;

    gating::ensure_module_unlocked(&pool, user_id, module_id).await?;

    let chapters = sqlx::query_as::<_, ChapterSummary>(
        r#"
        SELECT id, module_id, title, order_index
        FROM chapters
        WHERE module_id = $1
        ORDER BY order_index
        "#,
    )
    .bind(module_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list chapters: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(chapters))
}

/// Retrieves one chapter's body together with its quiz questions.
/// Correct answers and explanations stay hidden until submission.
pub async fn get_chapter(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let chapter = sqlx::query_as::<_, Chapter>(
        r#"
        SELECT id, module_id, title, content, order_index, created_at
        FROM chapters
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Chapter not found".to_string()))?;

    gating::ensure_module_unlocked(&pool, user_id, chapter.module_id).await?;

    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, chapter_id, prompt, options, correct_index, explanation, created_at
        FROM questions
        WHERE chapter_id = $1
        ORDER BY id
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let public_questions: Vec<PublicQuestion> =
        questions.into_iter().map(PublicQuestion::from).collect();

    Ok(Json(serde_json::json!({
        "chapter": chapter,
        "questions": public_questions,
    })))
}
