// src/models/chapter.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'chapters' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub module_id: i64,
    pub title: String,

    /// Chapter body (markdown/HTML), sanitized before storage.
    pub content: String,

    /// Position of the chapter within its module, starting at 1.
    pub order_index: i32,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Chapter row without the body, for module outlines.
#[derive(Debug, Serialize, FromRow)]
pub struct ChapterSummary {
    pub id: i64,
    pub module_id: i64,
    pub title: String,
    pub order_index: i32,
}

/// DTO for creating a chapter.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateChapterRequest {
    pub module_id: i64,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 50000))]
    #[serde(default)]
    pub content: String,
    #[validate(range(min = 1))]
    pub order_index: i32,
}
