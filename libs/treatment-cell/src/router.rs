use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

/// Mounted next to the patient routes: paths are relative to `/patients`.
pub fn treatment_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/{patient_id}/treatments", post(handlers::record_treatment))
        .route("/{patient_id}/treatments", get(handlers::list_treatments))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
