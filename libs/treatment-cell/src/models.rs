use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry in a patient's treatment history, with the billing amounts
/// recorded alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treatment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub procedure_name: String,
    pub tooth_number: Option<String>,
    pub cost: f64,
    pub payment_received: f64,
    pub notes: Option<String>,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTreatmentRequest {
    pub procedure_name: String,
    pub tooth_number: Option<String>,
    pub cost: Option<f64>,
    pub payment_received: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TreatmentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
