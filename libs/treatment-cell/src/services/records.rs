use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{RecordTreatmentRequest, Treatment, TreatmentError};

pub struct TreatmentRecordService {
    supabase: SupabaseClient,
}

impl TreatmentRecordService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn record(
        &self,
        patient_id: Uuid,
        request: RecordTreatmentRequest,
        auth_token: &str,
    ) -> Result<Treatment, TreatmentError> {
        debug!("Recording treatment for patient {}", patient_id);

        let cost = request.cost.unwrap_or(0.0);
        let payment_received = request.payment_received.unwrap_or(0.0);
        if cost < 0.0 || payment_received < 0.0 {
            return Err(TreatmentError::InvalidInput(
                "cost and payment cannot be negative".to_string(),
            ));
        }

        let treatment_data = json!({
            "patient_id": patient_id,
            "procedure_name": request.procedure_name,
            "tooth_number": request.tooth_number,
            "cost": cost,
            "payment_received": payment_received,
            "notes": request.notes,
            "date": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/treatments",
                Some(auth_token),
                Some(treatment_data),
                Some(headers),
            )
            .await
            .map_err(|e| TreatmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            TreatmentError::DatabaseError("Failed to record treatment".to_string())
        })?;

        let treatment: Treatment = serde_json::from_value(row).map_err(|e| {
            TreatmentError::DatabaseError(format!("Failed to parse treatment: {}", e))
        })?;

        info!(
            "Treatment {} recorded for patient {}",
            treatment.id, patient_id
        );
        Ok(treatment)
    }

    pub async fn list_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Treatment>, TreatmentError> {
        let path = format!(
            "/rest/v1/treatments?patient_id=eq.{}&order=date.desc",
            patient_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| TreatmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Treatment>, _>>()
            .map_err(|e| TreatmentError::DatabaseError(format!("Failed to parse treatments: {}", e)))
    }
}
