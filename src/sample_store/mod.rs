// Sample store: the document store holding per-device minute records, the latest
// snapshot and the alert feed. The sweeper and fetcher only see the `SampleStore` trait;
// the SQLite implementation lives in `sqlite`.

mod sqlite;

pub use sqlite::SqliteStore;

use std::future::Future;
use std::time::Duration;

use crate::models::{AlertRecord, LatestSnapshot, MinuteRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transport-level failure of a query or delete.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

pub trait SampleStore: Send + Sync {
    /// Every device that has uploaded at least once.
    fn list_devices(&self) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Records whose charted time (`createdAt`, else `uploadedAt`, else first sample) lies in
    /// `[from_ms, to_ms]`. Order is not guaranteed.
    fn query_created_between(
        &self,
        device_id: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> impl Future<Output = Result<Vec<MinuteRecord>, StoreError>> + Send;

    /// Retention candidates: records the store believes are older than `cutoff_ms`.
    /// A coarse filter; callers re-check each record's timestamp before deleting.
    fn query_expired(
        &self,
        device_id: &str,
        cutoff_ms: i64,
    ) -> impl Future<Output = Result<Vec<MinuteRecord>, StoreError>> + Send;

    /// Delete one record. `Ok(false)` when it was already gone.
    fn delete_record(
        &self,
        device_id: &str,
        record_id: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn latest(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<Option<LatestSnapshot>, StoreError>> + Send;

    /// Newest first.
    fn recent_alerts(
        &self,
        device_id: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<AlertRecord>, StoreError>> + Send;

    /// Reclaim space after deletes. No-op unless the backend needs it.
    fn compact(&self) -> impl Future<Output = Result<(), StoreError>> + Send {
        async { Ok(()) }
    }
}

/// Bound a store call by `limit`; elapsed calls surface as `StoreError::Timeout`.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
