use chrono::FixedOffset;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::downsample::{self, Tier, TierPolicy};
use crate::retention_worker::{SweepSchedule, SweeperConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: String,
    pub max_pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Minute records uploaded more than this many days ago are pruned.
    pub horizon_days: u32,
    /// Cron expression with seconds field, evaluated in `utc_offset`.
    pub schedule: String,
    /// Pinned offset for the schedule (e.g. "+07:00"), so audit logs line up across hosts.
    pub utc_offset: String,
    pub max_concurrent_devices: usize,
    /// Cap on deletions per sweep; unset = unlimited.
    pub max_deletes_per_run: Option<u64>,
    /// Count what would be deleted without deleting.
    pub dry_run: bool,
    pub run_on_start: bool,
    pub vacuum_after_sweep: bool,
    pub store_timeout_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            horizon_days: 7,
            schedule: "0 0 0 * * *".into(),
            utc_offset: "+07:00".into(),
            max_concurrent_devices: 4,
            max_deletes_per_run: None,
            dry_run: false,
            run_on_start: false,
            vacuum_after_sweep: true,
            store_timeout_secs: 30,
        }
    }
}

impl RetentionConfig {
    pub fn offset(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::from_str(&self.utc_offset).map_err(|e| {
            anyhow::anyhow!("retention.utc_offset {:?} is invalid: {}", self.utc_offset, e)
        })
    }

    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            horizon_days: self.horizon_days,
            max_concurrent_devices: self.max_concurrent_devices,
            max_deletes_per_run: self.max_deletes_per_run,
            dry_run: self.dry_run,
            store_timeout: Duration::from_secs(self.store_timeout_secs),
        }
    }

    pub fn sweep_schedule(&self) -> anyhow::Result<SweepSchedule> {
        Ok(SweepSchedule {
            cron: self.schedule.clone(),
            utc_offset: self.offset()?,
            run_on_start: self.run_on_start,
            vacuum_after_sweep: self.vacuum_after_sweep,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Upper bound on one history query against the store.
    pub query_timeout_secs: u64,
    pub tiers: Vec<Tier>,
    /// Point cap for windows longer than every tier.
    pub default_points: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: 10,
            tiers: downsample::default_tiers(),
            default_points: downsample::DEFAULT_FALLBACK_POINTS,
        }
    }
}

impl HistoryConfig {
    pub fn tier_policy(&self) -> TierPolicy {
        TierPolicy::new(self.tiers.clone(), self.default_points)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(!self.store.path.is_empty(), "store.path must be non-empty");
        anyhow::ensure!(
            self.store.max_pool_size > 0,
            "store.max_pool_size must be > 0, got {}",
            self.store.max_pool_size
        );
        anyhow::ensure!(
            self.retention.horizon_days > 0,
            "retention.horizon_days must be > 0, got {}",
            self.retention.horizon_days
        );
        anyhow::ensure!(
            self.retention.max_concurrent_devices > 0,
            "retention.max_concurrent_devices must be > 0, got {}",
            self.retention.max_concurrent_devices
        );
        anyhow::ensure!(
            self.retention.max_deletes_per_run != Some(0),
            "retention.max_deletes_per_run must be > 0 when set"
        );
        anyhow::ensure!(
            self.retention.store_timeout_secs > 0,
            "retention.store_timeout_secs must be > 0, got {}",
            self.retention.store_timeout_secs
        );
        cron::Schedule::from_str(&self.retention.schedule).map_err(|e| {
            anyhow::anyhow!(
                "retention.schedule {:?} is not a valid cron expression: {}",
                self.retention.schedule,
                e
            )
        })?;
        self.retention.offset()?;
        anyhow::ensure!(
            self.history.query_timeout_secs > 0,
            "history.query_timeout_secs must be > 0, got {}",
            self.history.query_timeout_secs
        );
        anyhow::ensure!(
            self.history.default_points > 0,
            "history.default_points must be > 0, got {}",
            self.history.default_points
        );
        for tier in &self.history.tiers {
            anyhow::ensure!(
                tier.points > 0,
                "history.tiers points must be > 0 (tier max_hours = {})",
                tier.max_hours
            );
        }
        Ok(())
    }
}
