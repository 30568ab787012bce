use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, SchedulingError};

pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Check the candidate half-open interval `[start, end)` against every
    /// non-cancelled appointment, optionally excluding one id (used when an
    /// appointment is re-checked against itself during an edit).
    pub async fn has_conflict(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<bool, SchedulingError> {
        debug!("Checking conflicts from {} to {}", start_time, end_time);

        let existing = self
            .appointments_in_range(start_time, end_time, exclude_appointment_id, auth_token)
            .await?;

        // The store already prefilters on the interval columns; re-apply the
        // overlap predicate so correctness never depends on the query alone.
        let conflicting = existing
            .iter()
            .any(|appt| intervals_overlap(appt.start_time, appt.end_time, start_time, end_time));

        if conflicting {
            warn!("Conflict detected for slot {} - {}", start_time, end_time);
        }

        Ok(conflicting)
    }

    async fn appointments_in_range(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let mut query_parts = vec![
            format!("start_time=lt.{}", urlencoding::encode(&end_time.to_rfc3339())),
            format!("end_time=gt.{}", urlencoding::encode(&start_time.to_rfc3339())),
            "status=neq.cancelled".to_string(),
        ];

        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/appointments?{}&order=start_time.asc",
            query_parts.join("&")
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
}

/// Strict overlap on half-open intervals: touching endpoints do not collide,
/// so back-to-back appointments are allowed.
pub(crate) fn intervals_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
    }

    #[test]
    fn partial_overlap_collides() {
        assert!(intervals_overlap(at(10, 0), at(10, 30), at(10, 15), at(10, 45)));
        assert!(intervals_overlap(at(10, 15), at(10, 45), at(10, 0), at(10, 30)));
    }

    #[test]
    fn containment_collides() {
        assert!(intervals_overlap(at(9, 0), at(11, 0), at(9, 30), at(10, 0)));
    }

    #[test]
    fn back_to_back_does_not_collide() {
        assert!(!intervals_overlap(at(10, 0), at(10, 30), at(10, 30), at(11, 0)));
        assert!(!intervals_overlap(at(10, 30), at(11, 0), at(10, 0), at(10, 30)));
    }

    #[test]
    fn disjoint_does_not_collide() {
        assert!(!intervals_overlap(at(9, 0), at(9, 30), at(14, 0), at(14, 30)));
    }
}
