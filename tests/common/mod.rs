// Shared test helpers
#![allow(dead_code)]

use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tempmon::models::{AlertRecord, LatestSnapshot, MinuteRecord};
use tempmon::sample_store::{SampleStore, SqliteStore, StoreError};

pub const MS_PER_MINUTE: i64 = 60_000;
pub const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;
/// 2024-01-01T00:00:00Z
pub const BASE_MS: i64 = 1_704_067_200_000;

pub fn iso(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .unwrap()
        .to_rfc3339()
}

/// Minute document in the flat `avg` schema, created and uploaded at `ms`.
pub fn temp_minute(ms: i64, avg: f64) -> Value {
    json!({
        "createdAt": iso(ms),
        "uploaded_at": iso(ms),
        "avg": avg,
    })
}

pub fn record(id: &str, doc: Value) -> MinuteRecord {
    match doc {
        Value::Object(map) => MinuteRecord::from_document(id, &map),
        other => panic!("test document must be an object, got {}", other),
    }
}

pub async fn temp_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tempmon.db");
    let store = SqliteStore::connect(path.to_str().unwrap(), 2).await.unwrap();
    store.init().await.unwrap();
    (dir, store)
}

/// In-memory store with failure knobs, for partial-failure and offline paths.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, Vec<MinuteRecord>>>,
    unavailable: AtomicBool,
    failing_devices: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    query_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn insert(&self, device_id: &str, record: MinuteRecord) {
        self.records
            .lock()
            .unwrap()
            .entry(device_id.to_string())
            .or_default()
            .push(record);
    }

    pub fn count(&self, device_id: &str) -> usize {
        self.records
            .lock()
            .unwrap()
            .get(device_id)
            .map_or(0, Vec::len)
    }

    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub fn fail_device(&self, device_id: &str) {
        self.failing_devices
            .lock()
            .unwrap()
            .insert(device_id.to_string());
    }

    pub fn fail_delete(&self, record_id: &str) {
        self.failing_deletes
            .lock()
            .unwrap()
            .insert(record_id.to_string());
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.lock().unwrap() = Some(delay);
    }

    fn check(&self, device_id: Option<&str>) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        if let Some(id) = device_id
            && self.failing_devices.lock().unwrap().contains(id)
        {
            return Err(StoreError::Unavailable(format!("device {} shard offline", id)));
        }
        Ok(())
    }
}

impl SampleStore for MemoryStore {
    async fn list_devices(&self) -> Result<Vec<String>, StoreError> {
        self.check(None)?;
        Ok(self.records.lock().unwrap().keys().cloned().collect())
    }

    async fn query_created_between(
        &self,
        device_id: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<MinuteRecord>, StoreError> {
        let delay = *self.query_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(Some(device_id))?;
        let records = self.records.lock().unwrap();
        let mut out: Vec<MinuteRecord> = records
            .get(device_id)
            .into_iter()
            .flatten()
            .filter(|r| {
                r.charted_at_ms()
                    .is_some_and(|t| t >= from_ms && t <= to_ms)
            })
            .cloned()
            .collect();
        // Newest first, like the document store.
        out.reverse();
        Ok(out)
    }

    async fn query_expired(
        &self,
        device_id: &str,
        cutoff_ms: i64,
    ) -> Result<Vec<MinuteRecord>, StoreError> {
        self.check(Some(device_id))?;
        let records = self.records.lock().unwrap();
        // Coarse on purpose: records of unknown age are handed back too.
        Ok(records
            .get(device_id)
            .into_iter()
            .flatten()
            .filter(|r| r.retention_timestamp().millis().is_none_or(|t| t < cutoff_ms))
            .cloned()
            .collect())
    }

    async fn delete_record(&self, device_id: &str, record_id: &str) -> Result<bool, StoreError> {
        self.check(None)?;
        if self.failing_deletes.lock().unwrap().contains(record_id) {
            return Err(StoreError::Unavailable(format!("delete {} rejected", record_id)));
        }
        let mut records = self.records.lock().unwrap();
        let Some(list) = records.get_mut(device_id) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|r| r.id != record_id);
        Ok(list.len() < before)
    }

    async fn latest(&self, _device_id: &str) -> Result<Option<LatestSnapshot>, StoreError> {
        self.check(None)?;
        Ok(None)
    }

    async fn recent_alerts(
        &self,
        _device_id: &str,
        _limit: u32,
    ) -> Result<Vec<AlertRecord>, StoreError> {
        self.check(None)?;
        Ok(vec![])
    }
}
