use crate::config::Config;
use crate::grader::HttpGrader;
use axum::extract::FromRef;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    /// Absent when GRADER_API_URL is not configured; the admin review
    /// workflow must behave identically either way.
    pub grader: Option<Arc<HttpGrader>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let grader = HttpGrader::from_config(&config).map(Arc::new);
        Self {
            pool,
            config,
            grader,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
