// src/handlers/messages.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::message::{Message, SendMessageRequest},
    utils::{html::clean_html, jwt::Claims},
};

/// Sends a message from a student to the administrators.
/// One-way channel; not part of the gating logic.
pub async fn send_message(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;

    let full_name: String = sqlx::query_scalar("SELECT full_name FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let message_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO messages (user_id, user_full_name, content)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(full_name)
    .bind(clean_html(&payload.content))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to send message: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": message_id})),
    ))
}

/// Lists all messages, newest first.
/// Admin only.
pub async fn list_messages(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let messages = sqlx::query_as::<_, Message>(
        r#"
        SELECT id, user_id, user_full_name, content, is_read, created_at
        FROM messages
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list messages: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(messages))
}

/// Marks a message as read.
/// Admin only.
pub async fn mark_message_read(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("UPDATE messages SET is_read = TRUE WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to mark message as read: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Message not found".to_string()));
    }

    Ok(StatusCode::OK)
}
