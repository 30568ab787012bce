use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{error_status, SupabaseClient};

use crate::models::{Patient, PatientError, PatientRole};

pub struct PatientDirectoryService {
    supabase: SupabaseClient,
}

impl PatientDirectoryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Fetching patient: {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(PatientError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| PatientError::DatabaseError(format!("Failed to parse patient: {}", e)))
    }

    pub async fn find_by_username(
        &self,
        username: &str,
        auth_token: &str,
    ) -> Result<Option<Patient>, PatientError> {
        let path = format!(
            "/rest/v1/patients?username=eq.{}",
            urlencoding::encode(username)
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => {
                let patient: Patient = serde_json::from_value(row).map_err(|e| {
                    PatientError::DatabaseError(format!("Failed to parse patient: {}", e))
                })?;
                Ok(Some(patient))
            }
            None => Ok(None),
        }
    }

    /// Resolve a guest contact into a persistent patient identity.
    ///
    /// The contact handle (phone number) is a unique key in the store. Two
    /// concurrent calls for the same handle race on the insert; the loser
    /// gets a unique-constraint violation and reuses the winner's row.
    pub async fn resolve_or_create(
        &self,
        contact_handle: &str,
        display_name: &str,
        phone: &str,
        auth_token: &str,
    ) -> Result<Uuid, PatientError> {
        if let Some(existing) = self.find_by_username(contact_handle, auth_token).await? {
            debug!("Reusing patient {} for contact {}", existing.id, contact_handle);
            return Ok(existing.id);
        }

        let patient_data = json!({
            "username": contact_handle,
            "email": format!("{}@hasta.com", contact_handle),
            "full_name": display_name,
            "phone": phone,
            "role": PatientRole::Patient.to_string(),
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let created: Result<Vec<Value>, _> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/patients",
                Some(auth_token),
                Some(patient_data),
                Some(headers),
            )
            .await;

        match created {
            Ok(rows) => {
                let row = rows.into_iter().next().ok_or_else(|| {
                    PatientError::DatabaseError("Failed to create patient record".to_string())
                })?;
                let patient: Patient = serde_json::from_value(row).map_err(|e| {
                    PatientError::DatabaseError(format!("Failed to parse created patient: {}", e))
                })?;
                info!("Created patient {} for guest contact {}", patient.id, contact_handle);
                Ok(patient.id)
            }
            // Unique violation on username: another request created the row
            // between our lookup and the insert. Reuse it.
            Err(e) if error_status(&e) == Some(409) => {
                debug!("Contact {} was registered concurrently, reusing", contact_handle);
                self.find_by_username(contact_handle, auth_token)
                    .await?
                    .map(|p| p.id)
                    .ok_or_else(|| {
                        PatientError::DatabaseError(
                            "Unique violation without a matching patient row".to_string(),
                        )
                    })
            }
            Err(e) => Err(PatientError::DatabaseError(e.to_string())),
        }
    }
}
