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

use crate::models::{RecordTreatmentRequest, TreatmentError};
use crate::services::records::TreatmentRecordService;

fn to_app_error(e: TreatmentError) -> AppError {
    match e {
        TreatmentError::InvalidInput(msg) => AppError::BadRequest(msg),
        TreatmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn record_treatment(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RecordTreatmentRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_staff() {
        return Err(AppError::Forbidden(
            "Only staff may record treatments".to_string(),
        ));
    }

    let service = TreatmentRecordService::new(&state);
    let treatment = service
        .record(patient_id, request, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "treatment": treatment,
        "message": "Treatment recorded"
    })))
}

#[axum::debug_handler]
pub async fn list_treatments(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let is_self = user.id == patient_id.to_string();
    if !is_self && !user.is_staff() {
        return Err(AppError::Forbidden(
            "Not authorized to view this patient's treatments".to_string(),
        ));
    }

    let service = TreatmentRecordService::new(&state);
    let treatments = service
        .list_for_patient(patient_id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(treatments)))
}
