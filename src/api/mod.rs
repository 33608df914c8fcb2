pub mod auth;
pub mod reports;
pub mod tasks;
pub mod users;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/auth", auth_routes())
        .nest("/api/users", user_routes())
        // `nest` does not match the bare trailing-slash path in axum 0.8,
        // so `/api/tasks/` is wired explicitly.
        .route(
            "/api/tasks/",
            get(tasks::list_tasks).post(tasks::create_task),
        )
        .nest("/api/tasks", task_routes())
        .nest("/api/reports", report_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route(
            "/profile",
            get(auth::get_profile).put(auth::update_profile),
        )
}

fn user_routes() -> Router<AppState> {
    Router::new().route("/", get(users::list_users)).route(
        "/{id}",
        get(users::get_user)
            .put(users::update_user)
            .delete(users::delete_user),
    )
}

fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route("/dashboard", get(tasks::dashboard))
        .route(
            "/{id}",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/{id}/status", put(tasks::update_task_checklist))
}

fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/import/users", post(reports::import_users_sheet))
        .route("/import/users-tasks", post(reports::import_full_sheet))
        .route("/export/template", get(reports::export_template))
        .route("/export/users", get(reports::export_users))
        .route("/export/tasks", get(reports::export_tasks))
        .route(
            "/export/users-empty-tasks",
            get(reports::export_users_empty_tasks),
        )
        .route("/export/users-tasks", get(reports::export_users_and_tasks))
}

async fn health() -> &'static str {
    "ok"
}
