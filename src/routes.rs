// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{activity, admin, auth, catalog, messages, progress, quiz},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, catalog, quiz, activity, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool, Config, optional grader).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    // Catalog with per-student gating verdicts.
    let module_routes = Router::new()
        .route("/", get(catalog::list_modules))
        .route("/{slug}/chapters", get(catalog::list_module_chapters))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let chapter_routes = Router::new()
        .route("/{id}", get(catalog::get_chapter))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let quiz_routes = Router::new()
        .route("/{chapter_id}/submit", post(quiz::submit_quiz))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let activity_routes = Router::new()
        .route(
            "/{chapter_id}",
            get(activity::get_activity).put(activity::save_activity),
        )
        .route("/{chapter_id}/submit", post(activity::submit_activity))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let progress_routes = Router::new()
        .route("/me", get(progress::get_my_progress))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let message_routes = Router::new()
        .route("/", post(messages::send_message))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/students", get(admin::list_students))
        .route("/users", post(admin::create_user))
        .route(
            "/review/{user_id}/{chapter_id}",
            post(admin::review_submission),
        )
        .route(
            "/rollback/{user_id}/{chapter_id}",
            post(admin::rollback_submission),
        )
        .route(
            "/reset-attempts/{user_id}/{chapter_id}",
            post(admin::reset_attempts),
        )
        .route(
            "/force-unlock/{user_id}/{chapter_id}",
            post(admin::force_unlock),
        )
        .route(
            "/conditional-access/{user_id}",
            post(admin::set_conditional_access),
        )
        .route("/suggest-grade", post(admin::suggest_grade))
        .route("/messages", get(messages::list_messages))
        .route("/messages/{id}/read", post(messages::mark_message_read))
        .route("/modules", post(admin::create_module))
        .route(
            "/modules/{id}",
            put(admin::update_module).delete(admin::delete_module),
        )
        .route("/chapters", post(admin::create_chapter))
        .route(
            "/chapters/{id}",
            put(admin::update_chapter).delete(admin::delete_chapter),
        )
        .route("/questions", post(admin::create_question))
        .route(
            "/questions/{id}",
            delete(admin::delete_question).put(admin::update_question),
        )
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/modules", module_routes)
        .nest("/api/chapters", chapter_routes)
        .nest("/api/quiz", quiz_routes)
        .nest("/api/activity", activity_routes)
        .nest("/api/progress", progress_routes)
        .nest("/api/messages", message_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
