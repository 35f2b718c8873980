//! Router assembly.

use crate::handlers;
use crate::state::AppState;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::Router;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Builds the full JSON API. An empty `allowed_origins` allows any origin.
pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/me", get(handlers::current_user))
        .route("/auth/refresh", post(handlers::refresh_token))
        .route("/auth/logout", post(handlers::logout))
        .route("/tasks", post(handlers::create_task).get(handlers::list_tasks))
        .route(
            "/tasks/{id}",
            get(handlers::get_task)
                .put(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route("/tasks/{id}/move", patch(handlers::move_task))
        .route("/tasks/{id}/activity", get(handlers::list_activity))
        .route(
            "/projects",
            post(handlers::create_project).get(handlers::list_projects),
        )
        .route("/projects/{id}", get(handlers::get_project))
        .route("/projects/{id}/boards", get(handlers::list_project_boards))
        .route("/boards", post(handlers::create_board))
        .route("/boards/{id}", get(handlers::get_board))
        .route("/boards/{id}/columns", get(handlers::list_board_columns))
        .route("/columns", post(handlers::create_column))
        .route("/columns/{id}/tasks", get(handlers::list_column_tasks))
        .route("/columns/{id}/compact", post(handlers::compact_column))
        .layer(middleware::from_fn(log_request))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!(
                    "event=cors_config module=api status=skipped origin={}",
                    origin
                );
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn log_request(request: Request, next: Next) -> Response {
    let started_at = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    let status = response.status();
    let duration_ms = started_at.elapsed().as_millis();
    if status.is_server_error() {
        log::error!(
            "event=http_request module=api method={} path={} status={} duration_ms={}",
            method,
            path,
            status.as_u16(),
            duration_ms
        );
    } else {
        log::info!(
            "event=http_request module=api method={} path={} status={} duration_ms={}",
            method,
            path,
            status.as_u16(),
            duration_ms
        );
    }
    response
}
