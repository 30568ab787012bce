use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use patient_cell::services::directory::PatientDirectoryService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentStatus, BookAppointmentRequest, SchedulingError,
    UpdateAppointmentRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::locking::SlotLockService;
use crate::services::procedures::ProcedureCatalog;

const MAX_LOCK_ATTEMPTS: u32 = 3;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    conflict_service: ConflictDetectionService,
    lock_service: SlotLockService,
    directory: PatientDirectoryService,
    catalog: ProcedureCatalog,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_catalog(config, ProcedureCatalog::default())
    }

    pub fn with_catalog(config: &AppConfig, catalog: ProcedureCatalog) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&supabase)),
            lock_service: SlotLockService::new(Arc::clone(&supabase)),
            directory: PatientDirectoryService::new(config),
            supabase,
            catalog,
        }
    }

    /// Book a slot for the acting patient, or for a guest contact when no
    /// patient identity is acting (staff entering a walk-in by phone).
    pub async fn book(
        &self,
        request: BookAppointmentRequest,
        acting_patient: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let start_time = combine_date_time(&request.date, &request.time)?;
        let duration = self.catalog.duration_minutes(&request.procedure);
        let end_time = start_time + ChronoDuration::minutes(duration);

        info!(
            "Booking {} from {} to {}",
            request.procedure, start_time, end_time
        );

        for attempt in 1..=MAX_LOCK_ATTEMPTS {
            match self.lock_service.acquire(start_time, end_time).await? {
                Some(keys) => {
                    let result = self
                        .book_locked(&request, acting_patient, start_time, end_time, auth_token)
                        .await;
                    self.lock_service.release(&keys).await;
                    return result;
                }
                None => {
                    warn!(
                        "Slot lock contention, retrying attempt {}/{}",
                        attempt, MAX_LOCK_ATTEMPTS
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(100 * attempt as u64))
                        .await;
                }
            }
        }

        Err(SchedulingError::DatabaseError(
            "Could not serialize booking after multiple attempts".to_string(),
        ))
    }

    async fn book_locked(
        &self,
        request: &BookAppointmentRequest,
        acting_patient: Option<Uuid>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        if self
            .conflict_service
            .has_conflict(start_time, end_time, None, auth_token)
            .await?
        {
            return Err(SchedulingError::ConflictDetected);
        }

        // The slot is free; only now touch the patient directory so a
        // rejected booking leaves no record behind.
        let patient_id = match acting_patient {
            Some(id) => Some(id),
            None => self.resolve_guest(request, auth_token).await?,
        };

        let now = Utc::now();
        let appointment_data = json!({
            "patient_id": patient_id,
            "procedure": request.procedure,
            "start_time": start_time.to_rfc3339(),
            "end_time": end_time.to_rfc3339(),
            "guest_name": request.guest_name,
            "guest_phone": request.guest_phone,
            "notes": request.notes,
            "status": AppointmentStatus::Confirmed.to_string(),
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let appointment = self
            .insert_appointment(appointment_data, auth_token)
            .await?;

        info!(
            "Appointment {} booked for {}",
            appointment.id, appointment.start_time
        );
        Ok(appointment)
    }

    async fn resolve_guest(
        &self,
        request: &BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Option<Uuid>, SchedulingError> {
        let phone = match request.guest_phone.as_deref().filter(|p| !p.is_empty()) {
            Some(phone) => phone,
            None => return Ok(None),
        };

        let name = request.guest_name.as_deref().unwrap_or("");
        let patient_id = self
            .directory
            .resolve_or_create(phone, name, phone, auth_token)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        Ok(Some(patient_id))
    }

    /// Apply a partial update. A reschedule (date + time together) recomputes
    /// the end from the effective procedure's duration and re-runs the
    /// conflict check with this appointment excluded.
    pub async fn update(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Updating appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        let mut update_data = Map::new();

        if let Some(procedure) = &request.procedure {
            if procedure.is_empty() {
                return Err(SchedulingError::InvalidInput(
                    "procedure cannot be empty".to_string(),
                ));
            }
            update_data.insert("procedure".to_string(), json!(procedure));
        }
        // Omitted fields stay as they are; a provided empty string clears
        // the nullable fields.
        if let Some(guest_name) = &request.guest_name {
            update_data.insert("guest_name".to_string(), nullable(guest_name));
        }
        if let Some(guest_phone) = &request.guest_phone {
            update_data.insert("guest_phone".to_string(), nullable(guest_phone));
        }
        if let Some(notes) = &request.notes {
            update_data.insert("notes".to_string(), nullable(notes));
        }

        let reschedule = match (&request.date, &request.time) {
            (Some(date), Some(time)) => Some(combine_date_time(date, time)?),
            (None, None) => None,
            _ => {
                return Err(SchedulingError::InvalidInput(
                    "date and time must be provided together".to_string(),
                ))
            }
        };

        if let Some(new_start) = reschedule {
            let procedure = request
                .procedure
                .as_deref()
                .unwrap_or(&current.procedure);
            let new_end =
                new_start + ChronoDuration::minutes(self.catalog.duration_minutes(procedure));

            update_data.insert("start_time".to_string(), json!(new_start.to_rfc3339()));
            update_data.insert("end_time".to_string(), json!(new_end.to_rfc3339()));

            for attempt in 1..=MAX_LOCK_ATTEMPTS {
                match self.lock_service.acquire(new_start, new_end).await? {
                    Some(keys) => {
                        let result = self
                            .reschedule_locked(&current, &request, new_start, new_end, update_data.clone(), auth_token)
                            .await;
                        self.lock_service.release(&keys).await;
                        return result;
                    }
                    None => {
                        warn!(
                            "Slot lock contention on reschedule, retrying attempt {}/{}",
                            attempt, MAX_LOCK_ATTEMPTS
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(100 * attempt as u64))
                            .await;
                    }
                }
            }

            return Err(SchedulingError::DatabaseError(
                "Could not serialize reschedule after multiple attempts".to_string(),
            ));
        }

        self.link_guest_patient(&current, &request, &mut update_data, auth_token)
            .await?;
        self.patch_appointment(appointment_id, update_data, auth_token)
            .await
    }

    async fn reschedule_locked(
        &self,
        current: &Appointment,
        request: &UpdateAppointmentRequest,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
        mut update_data: Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        if self
            .conflict_service
            .has_conflict(new_start, new_end, Some(current.id), auth_token)
            .await?
        {
            return Err(SchedulingError::ConflictDetected);
        }

        self.link_guest_patient(current, request, &mut update_data, auth_token)
            .await?;
        self.patch_appointment(current.id, update_data, auth_token)
            .await
    }

    /// Lazily upgrade an unlinked guest booking: once a phone number is
    /// known, resolve it to a patient record and link the appointment.
    async fn link_guest_patient(
        &self,
        current: &Appointment,
        request: &UpdateAppointmentRequest,
        update_data: &mut Map<String, Value>,
        auth_token: &str,
    ) -> Result<(), SchedulingError> {
        if current.patient_id.is_some() {
            return Ok(());
        }

        let phone = request
            .guest_phone
            .as_deref()
            .filter(|p| !p.is_empty())
            .or(current.guest_phone.as_deref().filter(|p| !p.is_empty()));

        let phone = match phone {
            Some(phone) => phone,
            None => return Ok(()),
        };

        let name = request
            .guest_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(current.guest_name.as_deref())
            .unwrap_or("");

        let patient_id = self
            .directory
            .resolve_or_create(phone, name, phone, auth_token)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        update_data.insert("patient_id".to_string(), json!(patient_id));
        Ok(())
    }

    /// Soft removal: the record is kept, the slot is freed.
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Cancelling appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        if current.status == AppointmentStatus::Cancelled {
            return Ok(current);
        }

        let mut update_data = Map::new();
        update_data.insert(
            "status".to_string(),
            json!(AppointmentStatus::Cancelled.to_string()),
        );

        let cancelled = self
            .patch_appointment(appointment_id, update_data, auth_token)
            .await?;

        info!("Appointment {} cancelled", appointment_id);
        Ok(cancelled)
    }

    /// Hard removal: the record is gone entirely.
    pub async fn delete(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), SchedulingError> {
        debug!("Deleting appointment: {}", appointment_id);

        self.get_appointment(appointment_id, auth_token).await?;

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        self.supabase
            .request::<Value>(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(SchedulingError::NotFound)?;
        serde_json::from_value(row).map_err(|e| {
            SchedulingError::DatabaseError(format!("Failed to parse appointment: {}", e))
        })
    }

    pub async fn appointments_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&order=start_time.desc",
            patient_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| {
                SchedulingError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })
    }

    async fn insert_appointment(
        &self,
        appointment_data: Value,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            SchedulingError::DatabaseError("Failed to create appointment".to_string())
        })?;

        serde_json::from_value(row).map_err(|e| {
            SchedulingError::DatabaseError(format!("Failed to parse created appointment: {}", e))
        })
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        mut update_data: Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update_data)),
                Some(headers),
            )
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            SchedulingError::DatabaseError("Failed to update appointment".to_string())
        })?;

        serde_json::from_value(row).map_err(|e| {
            SchedulingError::DatabaseError(format!("Failed to parse updated appointment: {}", e))
        })
    }
}

/// Empty strings clear a nullable column; anything else is stored as-is.
fn nullable(value: &str) -> Value {
    if value.is_empty() {
        Value::Null
    } else {
        json!(value)
    }
}

pub(crate) fn combine_date_time(date: &str, time: &str) -> Result<DateTime<Utc>, SchedulingError> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| SchedulingError::InvalidInput(format!("Unparseable date: {}", date)))?;
    let time = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| SchedulingError::InvalidInput(format!("Unparseable time: {}", time)))?;

    Ok(date.and_time(time).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn combines_date_and_time() {
        let start = combine_date_time("2025-03-10", "09:00").unwrap();
        assert_eq!(start.to_rfc3339(), "2025-03-10T09:00:00+00:00");
    }

    #[test]
    fn rejects_unparseable_date() {
        assert_matches!(
            combine_date_time("10.03.2025", "09:00"),
            Err(SchedulingError::InvalidInput(_))
        );
    }

    #[test]
    fn rejects_unparseable_time() {
        assert_matches!(
            combine_date_time("2025-03-10", "9am"),
            Err(SchedulingError::InvalidInput(_))
        );
    }

    #[test]
    fn empty_string_clears_a_nullable_field() {
        assert_eq!(nullable(""), Value::Null);
        assert_eq!(nullable("0555"), json!("0555"));
    }
}
