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
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{BookAppointmentRequest, SchedulingError, UpdateAppointmentRequest};
use crate::services::booking::AppointmentBookingService;
use crate::services::calendar::{CalendarService, CalendarViewer};

fn to_app_error(e: SchedulingError) -> AppError {
    match e {
        SchedulingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        SchedulingError::ConflictDetected => {
            AppError::Conflict("Requested slot overlaps an existing appointment".to_string())
        }
        SchedulingError::InvalidInput(msg) => AppError::BadRequest(msg),
        SchedulingError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn acting_patient_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid subject in token".to_string()))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    // Staff enter walk-ins by guest contact; patients always book for
    // themselves, so the acting identity is linked instead.
    let acting_patient = if user.is_staff() {
        None
    } else {
        Some(acting_patient_id(&user)?)
    };

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .book(request, acting_patient, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(to_app_error)?;

    let is_owner = appointment
        .patient_id
        .map(|id| id.to_string() == user.id)
        .unwrap_or(false);

    if !is_owner && !user.is_staff() {
        return Err(AppError::Forbidden(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_staff() {
        return Err(AppError::Forbidden(
            "Only staff may edit appointments".to_string(),
        ));
    }

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .update(appointment_id, request, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment updated"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(to_app_error)?;

    let is_owner = appointment
        .patient_id
        .map(|id| id.to_string() == user.id)
        .unwrap_or(false);

    if !is_owner && !user.is_staff() {
        return Err(AppError::Forbidden(
            "Not authorized to cancel this appointment".to_string(),
        ));
    }

    let cancelled = booking_service
        .cancel(appointment_id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": cancelled,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_staff() {
        return Err(AppError::Forbidden(
            "Only staff may delete appointments".to_string(),
        ));
    }

    let booking_service = AppointmentBookingService::new(&state);
    booking_service
        .delete(appointment_id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment deleted"
    })))
}

#[axum::debug_handler]
pub async fn calendar_events(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let viewer = CalendarViewer {
        patient_id: Uuid::parse_str(&user.id).ok(),
        privileged: user.is_staff(),
    };

    let calendar_service = CalendarService::new(Arc::new(SupabaseClient::new(&state)));
    let events = calendar_service
        .events_for_viewer(&viewer, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(events)))
}

#[axum::debug_handler]
pub async fn patient_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let is_self = user.id == patient_id.to_string();
    if !is_self && !user.is_staff() {
        return Err(AppError::Forbidden(
            "Not authorized to view this patient's appointments".to_string(),
        ));
    }

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .appointments_for_patient(patient_id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(appointments)))
}
