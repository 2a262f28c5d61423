pub mod dto;
pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{config::Config, session::SessionStore};
use handlers::ApiDoc;

/// Shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(sessions: SessionStore, config: Config) -> Self {
        Self {
            sessions,
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route(
            "/session",
            post(handlers::create_session).delete(handlers::delete_session),
        )
        .route("/session/user", get(handlers::get_current_user))
        .route("/sensors", get(handlers::list_sensors))
        .route("/sensors/recent", get(handlers::recent_sensors))
        .route("/sensors/extreme", get(handlers::extreme_sensor))
        .route("/sensors/{id}", get(handlers::get_sensor))
        .route("/sensors/{id}/history", get(handlers::sensor_history))
        .route("/dashboard/summary", get(handlers::dashboard_summary))
        .route("/dashboard/locations", get(handlers::dashboard_locations))
        .route("/dashboard/charts/{kind}", get(handlers::dashboard_chart))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
