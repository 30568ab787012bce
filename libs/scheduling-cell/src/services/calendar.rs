use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, CalendarEvent, SchedulingError};

/// Placeholder title shown in place of another patient's appointment.
const BUSY_TITLE: &str = "DOLU";

/// Who is looking at the calendar. Staff see everything; a patient sees
/// full detail only on their own appointments.
#[derive(Debug, Clone)]
pub struct CalendarViewer {
    pub patient_id: Option<Uuid>,
    pub privileged: bool,
}

pub struct CalendarService {
    supabase: Arc<SupabaseClient>,
}

impl CalendarService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn events_for_viewer(
        &self,
        viewer: &CalendarViewer,
        auth_token: &str,
    ) -> Result<Vec<CalendarEvent>, SchedulingError> {
        debug!("Listing calendar for viewer {:?}", viewer.patient_id);

        let path = "/rest/v1/appointments?status=neq.cancelled&order=start_time.asc";
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        let appointments = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| {
                SchedulingError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })?;

        Ok(appointments
            .iter()
            .map(|appt| event_for_viewer(appt, viewer))
            .collect())
    }
}

/// Project an appointment into what the viewer may see. Foreign entries
/// collapse to a busy placeholder for patient viewers.
fn event_for_viewer(appointment: &Appointment, viewer: &CalendarViewer) -> CalendarEvent {
    let is_mine =
        viewer.patient_id.is_some() && appointment.patient_id == viewer.patient_id;

    if !viewer.privileged && !is_mine {
        return CalendarEvent {
            id: appointment.id,
            title: BUSY_TITLE.to_string(),
            start: appointment.start_time,
            end: appointment.end_time,
            is_mine: false,
            procedure: None,
            guest_name: None,
            guest_phone: None,
            notes: None,
        };
    }

    // Staff see who the slot belongs to; a patient sees their procedure.
    let title = if viewer.privileged {
        appointment
            .guest_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| appointment.procedure.clone())
    } else {
        appointment.procedure.clone()
    };

    CalendarEvent {
        id: appointment.id,
        title,
        start: appointment.start_time,
        end: appointment.end_time,
        is_mine,
        procedure: Some(appointment.procedure.clone()),
        guest_name: appointment.guest_name.clone(),
        guest_phone: appointment.guest_phone.clone(),
        notes: appointment.notes.clone(),
    }
}
