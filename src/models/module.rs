// src/models/module.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'modules' table: the registry every gating decision reads.
///
/// Unlock thresholds are configuration rows supplied by the program owner,
/// not conditions baked into code. `gate_chapter_id` names the chapter whose
/// completion opens the next module; `min_completed_chapters` covers the
/// partial-completion variants (e.g. a module satisfied by 4 of 5 chapters).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,

    /// Order of the module within the program, starting at 0.
    pub position: i32,

    /// Quiz pass threshold (percentage) for chapters of this module.
    pub required_score: i32,

    pub gate_chapter_id: Option<i64>,

    pub min_completed_chapters: i32,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Module as seen by a student: registry data plus the gating verdict.
#[derive(Debug, Serialize)]
pub struct ModuleOverview {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub position: i32,
    pub required_score: i32,
    pub locked: bool,
    /// Whether this module's own completion requirements are met.
    pub satisfied: bool,
    /// True when the module is reachable only through conditional access.
    pub conditional: bool,
}

/// DTO for creating a module registry entry.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateModuleRequest {
    #[validate(length(min = 1, max = 64))]
    pub slug: String,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 0))]
    pub position: i32,
    #[validate(range(min = 0, max = 100))]
    #[serde(default = "default_required_score")]
    pub required_score: i32,
    pub gate_chapter_id: Option<i64>,
    #[validate(range(min = 0))]
    #[serde(default = "default_min_completed")]
    pub min_completed_chapters: i32,
}

fn default_required_score() -> i32 {
    75
}

fn default_min_completed() -> i32 {
    1
}
