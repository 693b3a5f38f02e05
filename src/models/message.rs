// src/models/message.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'messages' table: the one-way feedback channel from
/// students to administrators. Not part of the gating logic.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub user_id: i64,
    pub user_full_name: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending a message to the administrators.
#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(
        min = 1,
        max = 2000,
        message = "Message length must be between 1 and 2000 characters."
    ))]
    pub content: String,
}
