use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::SchedulingError;

/// Day-granularity slot locks.
///
/// The store is reached over PostgREST, which exposes no transactions, so
/// the conflict-check-then-insert sequence is serialized through lock rows
/// instead: one per calendar day the candidate interval touches, acquired in
/// date order. `lock_key` is unique in the store; a failed insert means
/// another booking currently holds that day.
pub struct SlotLockService {
    supabase: Arc<SupabaseClient>,
    lock_timeout_seconds: i64,
}

impl SlotLockService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            lock_timeout_seconds: 30,
        }
    }

    /// Try to take every lock covering `[start, end)`. Returns the held keys
    /// on success, `None` when another booking holds one of them.
    pub async fn acquire(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Vec<String>>, SchedulingError> {
        let keys = day_lock_keys(start_time, end_time);
        let mut held: Vec<String> = Vec::with_capacity(keys.len());

        for key in &keys {
            if self.acquire_key(key).await? {
                held.push(key.clone());
            } else {
                self.release(&held).await;
                return Ok(None);
            }
        }

        Ok(Some(held))
    }

    async fn acquire_key(&self, lock_key: &str) -> Result<bool, SchedulingError> {
        if self.try_insert_lock(lock_key).await {
            debug!("Slot lock acquired: {}", lock_key);
            return Ok(true);
        }

        // The key is taken. A crashed holder may have left a stale row
        // behind; clear anything past its expiry and try once more.
        self.cleanup_expired_lock(lock_key).await?;

        if self.try_insert_lock(lock_key).await {
            debug!("Slot lock acquired after expiry cleanup: {}", lock_key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn try_insert_lock(&self, lock_key: &str) -> bool {
        let now = Utc::now();
        let lock_data = json!({
            "lock_key": lock_key,
            "acquired_at": now.to_rfc3339(),
            "expires_at": (now + Duration::seconds(self.lock_timeout_seconds)).to_rfc3339(),
            "process_id": format!("scheduler_{}", Uuid::new_v4())
        });

        self.supabase
            .request::<Value>(
                Method::POST,
                "/rest/v1/scheduling_locks",
                None,
                Some(lock_data),
            )
            .await
            .is_ok()
    }

    async fn cleanup_expired_lock(&self, lock_key: &str) -> Result<(), SchedulingError> {
        let path = format!(
            "/rest/v1/scheduling_locks?lock_key=eq.{}&expires_at=lt.{}",
            lock_key,
            urlencoding::encode(&Utc::now().to_rfc3339())
        );

        self.supabase
            .request::<Value>(Method::DELETE, &path, None, None)
            .await
            .map(|_| ())
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))
    }

    /// Best-effort release; a key left behind expires on its own.
    pub async fn release(&self, keys: &[String]) {
        for key in keys {
            let path = format!("/rest/v1/scheduling_locks?lock_key=eq.{}", key);
            if let Err(e) = self
                .supabase
                .request::<Value>(Method::DELETE, &path, None, None)
                .await
            {
                warn!("Failed to release slot lock {}: {}", key, e);
            }
        }
    }
}

/// One key per calendar day the half-open interval touches, in date order so
/// competing bookings acquire in the same sequence.
fn day_lock_keys(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Vec<String> {
    let first = start_time.date_naive();
    let last = (end_time - Duration::seconds(1)).date_naive();

    let mut keys = vec![format!("slot-{}", first)];
    if last != first {
        keys.push(format!("slot-{}", last));
    }
    keys
}
