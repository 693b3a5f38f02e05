// src/grader.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::config::Config;
use crate::error::AppError;

/// An advisory grade produced by the external text-generation service.
/// Never committed without explicit human confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeSuggestion {
    pub score: i32,
    pub feedback: String,
}

/// Pluggable scorer behind the admin review workflow. The workflow must
/// function identically when no implementation is configured.
#[async_trait]
pub trait SuggestScorer: Send + Sync {
    async fn suggest(&self, submission: &serde_json::Value) -> Result<GradeSuggestion, AppError>;
}

/// Calls an external text-generation API with a constructed prompt and
/// expects a JSON object `{score, feedback}` back.
pub struct HttpGrader {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpGrader {
    /// Builds the grader when both GRADER_API_URL and GRADER_API_KEY are
    /// configured; otherwise the suggestion endpoint reports unavailable.
    pub fn from_config(config: &Config) -> Option<HttpGrader> {
        let api_url = config.grader_api_url.clone()?;
        let api_key = config.grader_api_key.clone()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .ok()?;

        Some(HttpGrader {
            client,
            api_url,
            api_key,
        })
    }

    fn build_prompt(submission: &serde_json::Value) -> String {
        format!(
            "You are assisting a human reviewer of a corporate training exercise. \
             Evaluate the student's free-text responses below and reply with a JSON \
             object of the form {{\"score\": <0-100>, \"feedback\": \"<short feedback>\"}} \
             and nothing else.\n\nStudent responses:\n{}",
            submission
        )
    }
}

#[async_trait]
impl SuggestScorer for HttpGrader {
    async fn suggest(&self, submission: &serde_json::Value) -> Result<GradeSuggestion, AppError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "prompt": Self::build_prompt(submission) }))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Grading suggestion request failed: {}", e);
                AppError::ServiceUnavailable("Grading suggestion service unreachable".to_string())
            })?;

        if !response.status().is_success() {
            tracing::warn!("Grading suggestion service returned {}", response.status());
            return Err(AppError::ServiceUnavailable(
                "Grading suggestion service returned an error".to_string(),
            ));
        }

        let mut suggestion: GradeSuggestion = response.json().await.map_err(|e| {
            tracing::warn!("Grading suggestion response was not valid JSON: {}", e);
            AppError::ServiceUnavailable(
                "Grading suggestion service returned an unexpected payload".to_string(),
            )
        })?;

        // The service output is untrusted advisory input.
        suggestion.score = suggestion.score.clamp(0, 100);

        Ok(suggestion)
    }
}
