use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A person known to the clinic: registered up front, or created lazily the
/// first time a guest books by phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    /// Unique contact handle. Guest-derived records use the phone number.
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub role: PatientRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PatientRole {
    Patient,
    Staff,
}

impl fmt::Display for PatientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatientRole::Patient => write!(f, "patient"),
            PatientRole::Staff => write!(f, "staff"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
