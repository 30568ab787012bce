use std::sync::Arc;

use axum::{routing::get, Router};

use patient_cell::router::patient_routes;
use scheduling_cell::router::scheduling_routes;
use shared_config::AppConfig;
use treatment_cell::router::treatment_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic API is running!" }))
        .nest("/appointments", scheduling_routes(state.clone()))
        .nest(
            "/patients",
            patient_routes(state.clone()).merge(treatment_routes(state)),
        )
}
