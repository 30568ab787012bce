use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::PatientError;
use crate::services::directory::PatientDirectoryService;

#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    // Patients may only read their own record; staff see everyone.
    let is_self = user.id == patient_id.to_string();
    if !is_self && !user.is_staff() {
        return Err(AppError::Forbidden(
            "Not authorized to view this patient".to_string(),
        ));
    }

    let directory = PatientDirectoryService::new(&state);
    let patient = directory
        .get_patient(patient_id, auth.token())
        .await
        .map_err(|e| match e {
            PatientError::NotFound => AppError::NotFound("Patient not found".to_string()),
            PatientError::DatabaseError(msg) => AppError::Database(msg),
        })?;

    Ok(Json(json!(patient)))
}
