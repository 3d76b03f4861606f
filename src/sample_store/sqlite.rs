// SQLite document store. Minute records are kept as JSON documents exactly as uploaded;
// `charted_at_ms` / `created_at_ms` / `uploaded_at_ms` are derived on write for range
// queries and stay NULL when the document's timestamp is missing or unparseable.

use serde_json::{Map, Value};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

use super::{SampleStore, StoreError};
use crate::models::{AlertRecord, AlertState, LatestSnapshot, MinuteRecord};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to SQLite at `path`, create parent dir and DB if missing, enable WAL + pragmas.
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS devices (id TEXT PRIMARY KEY, first_seen_ms INTEGER NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS minute_records (
                device_id TEXT NOT NULL,
                record_id TEXT NOT NULL,
                charted_at_ms INTEGER,
                created_at_ms INTEGER,
                uploaded_at_ms INTEGER,
                document TEXT NOT NULL,
                PRIMARY KEY (device_id, record_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_minute_charted ON minute_records(device_id, charted_at_ms)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_minute_uploaded ON minute_records(device_id, uploaded_at_ms)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS latest (device_id TEXT PRIMARY KEY, document TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL,
                ts_ms INTEGER NOT NULL,
                metric TEXT NOT NULL,
                value REAL NOT NULL,
                threshold REAL,
                severity TEXT NOT NULL,
                state TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_alerts_device_ts ON alerts(device_id, ts_ms)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn touch_device(&self, device_id: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT OR IGNORE INTO devices (id, first_seen_ms) VALUES ($1, $2)")
            .bind(device_id)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Upsert one minute document (uploader side). Creates the device on first upload.
    #[instrument(skip(self, document), fields(repo = "sample_store", operation = "save_minute"))]
    pub async fn save_minute(
        &self,
        device_id: &str,
        record_id: &str,
        document: &Value,
    ) -> anyhow::Result<()> {
        let Value::Object(doc) = document else {
            anyhow::bail!("minute document {} must be a JSON object", record_id);
        };
        let record = MinuteRecord::from_document(record_id, doc);
        self.touch_device(device_id).await?;
        sqlx::query(
            "INSERT OR REPLACE INTO minute_records (device_id, record_id, charted_at_ms, created_at_ms, uploaded_at_ms, document) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(device_id)
        .bind(record_id)
        .bind(record.charted_at_ms())
        .bind(record.created_at.millis())
        .bind(record.uploaded_at.millis())
        .bind(document.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_latest(&self, snapshot: &LatestSnapshot) -> anyhow::Result<()> {
        self.touch_device(&snapshot.device_id).await?;
        sqlx::query("INSERT OR REPLACE INTO latest (device_id, document) VALUES ($1, $2)")
            .bind(&snapshot.device_id)
            .bind(serde_json::to_string(snapshot)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn save_alert(&self, device_id: &str, alert: &AlertRecord) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO alerts (device_id, ts_ms, metric, value, threshold, severity, state) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(device_id)
        .bind(alert.ts)
        .bind(&alert.metric)
        .bind(alert.value)
        .bind(alert.threshold)
        .bind(&alert.severity)
        .bind(alert.state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_minutes(&self, device_id: &str) -> anyhow::Result<i64> {
        let n = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM minute_records WHERE device_id = $1",
        )
        .bind(device_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }

    fn parse_minute_rows(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<MinuteRecord>, StoreError> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let record_id: String = row.try_get("record_id")?;
            let document: String = row.try_get("document")?;
            match serde_json::from_str::<Map<String, Value>>(&document) {
                Ok(doc) => out.push(MinuteRecord::from_document(record_id, &doc)),
                Err(e) => {
                    tracing::debug!(record = %record_id, error = %e, "corrupt minute document, skipping");
                }
            }
        }
        Ok(out)
    }
}

impl SampleStore for SqliteStore {
    async fn list_devices(&self) -> Result<Vec<String>, StoreError> {
        let ids = sqlx::query_scalar::<_, String>("SELECT id FROM devices ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    #[instrument(skip(self), fields(repo = "sample_store", operation = "query_created_between"))]
    async fn query_created_between(
        &self,
        device_id: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<MinuteRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT record_id, document FROM minute_records
             WHERE device_id = $1 AND charted_at_ms >= $2 AND charted_at_ms <= $3
             ORDER BY charted_at_ms DESC",
        )
        .bind(device_id)
        .bind(from_ms)
        .bind(to_ms)
        .fetch_all(&self.pool)
        .await?;
        Self::parse_minute_rows(rows)
    }

    #[instrument(skip(self), fields(repo = "sample_store", operation = "query_expired"))]
    async fn query_expired(
        &self,
        device_id: &str,
        cutoff_ms: i64,
    ) -> Result<Vec<MinuteRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT record_id, document FROM minute_records
             WHERE device_id = $1 AND COALESCE(uploaded_at_ms, created_at_ms) < $2",
        )
        .bind(device_id)
        .bind(cutoff_ms)
        .fetch_all(&self.pool)
        .await?;
        Self::parse_minute_rows(rows)
    }

    async fn delete_record(&self, device_id: &str, record_id: &str) -> Result<bool, StoreError> {
        let r = sqlx::query("DELETE FROM minute_records WHERE device_id = $1 AND record_id = $2")
            .bind(device_id)
            .bind(record_id)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected() > 0)
    }

    async fn latest(&self, device_id: &str) -> Result<Option<LatestSnapshot>, StoreError> {
        let row = sqlx::query("SELECT document FROM latest WHERE device_id = $1")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let document: String = row.try_get("document")?;
        match serde_json::from_str(&document) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::debug!(device = %device_id, error = %e, "corrupt latest snapshot, ignoring");
                Ok(None)
            }
        }
    }

    async fn recent_alerts(&self, device_id: &str, limit: u32) -> Result<Vec<AlertRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT ts_ms, metric, value, threshold, severity, state FROM alerts
             WHERE device_id = $1 ORDER BY ts_ms DESC, id DESC LIMIT $2",
        )
        .bind(device_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let state: String = row.try_get("state")?;
            out.push(AlertRecord {
                ts: row.try_get("ts_ms")?,
                metric: row.try_get("metric")?,
                value: row.try_get("value")?,
                threshold: row.try_get("threshold")?,
                severity: row.try_get("severity")?,
                state: AlertState::from_db(&state),
            });
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(repo = "sample_store", operation = "vacuum"))]
    async fn compact(&self) -> Result<(), StoreError> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}
