// Retention sweeper: prune minute records older than the horizon, for every device.
// Runs on a cron schedule pinned to a fixed UTC offset; the schedule task is cancelled
// through the handle returned by `spawn`.
//
// Partial-failure tolerant: a failed device or delete is logged and the sweep moves on.
// A record whose age cannot be determined is never deleted.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use futures_util::{StreamExt, stream};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::models::RecordTimestamp;
use crate::sample_store::{SampleStore, with_timeout};

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
/// In-flight deletes per device; delete order within a device does not matter.
const DELETE_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub horizon_days: u32,
    pub max_concurrent_devices: usize,
    pub max_deletes_per_run: Option<u64>,
    pub dry_run: bool,
    pub store_timeout: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            horizon_days: 7,
            max_concurrent_devices: 4,
            max_deletes_per_run: None,
            dry_run: false,
            store_timeout: Duration::from_secs(30),
        }
    }
}

/// Completion signal of one sweep, with counts for the audit log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub devices: u64,
    /// Records the store returned as older than the cutoff.
    pub candidates: u64,
    /// Deleted (or, in dry-run mode, would have been deleted).
    pub deleted: u64,
    /// Delete acknowledged but nothing was there any more.
    pub already_gone: u64,
    pub failed: u64,
    /// Skipped because the retention timestamp was missing or unparseable.
    pub ambiguous: u64,
    pub device_errors: u64,
    pub budget_exhausted: bool,
}

impl SweepReport {
    fn absorb(&mut self, other: SweepReport) {
        self.devices += other.devices;
        self.candidates += other.candidates;
        self.deleted += other.deleted;
        self.already_gone += other.already_gone;
        self.failed += other.failed;
        self.ambiguous += other.ambiguous;
        self.device_errors += other.device_errors;
        self.budget_exhausted |= other.budget_exhausted;
    }
}

/// Shared per-run deletion allowance across concurrently swept devices.
struct DeleteBudget {
    remaining: Option<AtomicU64>,
}

impl DeleteBudget {
    fn new(limit: Option<u64>) -> Self {
        Self {
            remaining: limit.map(AtomicU64::new),
        }
    }

    fn try_take(&self) -> bool {
        match &self.remaining {
            None => true,
            Some(n) => n
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok(),
        }
    }
}

enum DeleteOutcome {
    Deleted,
    AlreadyGone,
    Failed,
}

pub struct Sweeper<S> {
    store: Arc<S>,
    config: SweeperConfig,
}

impl<S: SampleStore> Sweeper<S> {
    pub fn new(store: Arc<S>, config: SweeperConfig) -> Self {
        Self { store, config }
    }

    pub fn cutoff_ms(&self, now_ms: i64) -> i64 {
        now_ms - (self.config.horizon_days as i64) * MS_PER_DAY
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now().timestamp_millis()).await
    }

    #[instrument(skip(self), fields(horizon_days = self.config.horizon_days, dry_run = self.config.dry_run))]
    pub async fn sweep_at(&self, now_ms: i64) -> SweepReport {
        let cutoff_ms = self.cutoff_ms(now_ms);
        let mut report = SweepReport::default();

        let devices = match with_timeout(self.config.store_timeout, self.store.list_devices()).await
        {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "retention sweep: listing devices failed");
                report.device_errors += 1;
                return report;
            }
        };

        let budget = &DeleteBudget::new(self.config.max_deletes_per_run);
        let mut per_device = stream::iter(devices)
            .map(|device_id| async move { self.sweep_device(&device_id, cutoff_ms, budget).await })
            .buffer_unordered(self.config.max_concurrent_devices.max(1));
        while let Some(device_report) = per_device.next().await {
            report.absorb(device_report);
        }

        info!(
            cutoff_ms,
            devices = report.devices,
            deleted = report.deleted,
            failed = report.failed,
            ambiguous = report.ambiguous,
            device_errors = report.device_errors,
            budget_exhausted = report.budget_exhausted,
            "retention sweep complete"
        );
        report
    }

    #[instrument(skip(self, device_id, budget), fields(device = %device_id))]
    async fn sweep_device(
        &self,
        device_id: &str,
        cutoff_ms: i64,
        budget: &DeleteBudget,
    ) -> SweepReport {
        let mut report = SweepReport {
            devices: 1,
            ..SweepReport::default()
        };

        let candidates = match with_timeout(
            self.config.store_timeout,
            self.store.query_expired(device_id, cutoff_ms),
        )
        .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "retention sweep: expired query failed, skipping device");
                report.device_errors = 1;
                return report;
            }
        };
        report.candidates = candidates.len() as u64;

        let mut expired: Vec<String> = Vec::with_capacity(candidates.len());
        for record in &candidates {
            match record.retention_timestamp() {
                RecordTimestamp::Valid(ts) if *ts < cutoff_ms => {}
                RecordTimestamp::Valid(_) => continue,
                RecordTimestamp::Malformed(raw) => {
                    debug!(record = %record.id, raw = %raw, "unparseable retention timestamp, keeping");
                    report.ambiguous += 1;
                    continue;
                }
                RecordTimestamp::Missing => {
                    debug!(record = %record.id, "no retention timestamp, keeping");
                    report.ambiguous += 1;
                    continue;
                }
            }
            if !budget.try_take() {
                report.budget_exhausted = true;
                break;
            }
            expired.push(record.id.clone());
        }

        if self.config.dry_run {
            report.deleted = expired.len() as u64;
            debug!(would_delete = report.deleted, "dry run");
            return report;
        }

        let mut deletes = stream::iter(expired)
            .map(|record_id| async move { self.delete_one(device_id, &record_id).await })
            .buffer_unordered(DELETE_CONCURRENCY);
        while let Some(outcome) = deletes.next().await {
            match outcome {
                DeleteOutcome::Deleted => report.deleted += 1,
                DeleteOutcome::AlreadyGone => report.already_gone += 1,
                DeleteOutcome::Failed => report.failed += 1,
            }
        }

        if report.deleted > 0 || report.failed > 0 {
            debug!(
                deleted = report.deleted,
                failed = report.failed,
                "device swept"
            );
        }
        report
    }

    async fn delete_one(&self, device_id: &str, record_id: &str) -> DeleteOutcome {
        match with_timeout(
            self.config.store_timeout,
            self.store.delete_record(device_id, record_id),
        )
        .await
        {
            Ok(true) => DeleteOutcome::Deleted,
            Ok(false) => DeleteOutcome::AlreadyGone,
            Err(e) => {
                warn!(record = %record_id, error = %e, "retention sweep: delete failed");
                DeleteOutcome::Failed
            }
        }
    }
}

/// When and how the sweep runs.
#[derive(Debug, Clone)]
pub struct SweepSchedule {
    /// Cron expression with seconds field (e.g. "0 0 0 * * *" = midnight daily).
    pub cron: String,
    pub utc_offset: FixedOffset,
    pub run_on_start: bool,
    /// Compact the store after a sweep that deleted anything.
    pub vacuum_after_sweep: bool,
}

/// Next fire time strictly after `now`, in the schedule's pinned offset.
pub fn next_run_after(
    schedule: &cron::Schedule,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Option<DateTime<FixedOffset>> {
    schedule.after(&now.with_timezone(&offset)).next()
}

/// Handle to the scheduled sweep task.
pub struct ScheduleHandle {
    cancel_tx: Option<oneshot::Sender<()>>,
    join: tokio::task::JoinHandle<()>,
}

impl ScheduleHandle {
    /// Stop scheduling and wait for the task to exit. A sweep in progress finishes first.
    pub async fn cancel(mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}

/// Spawns the scheduled sweep. Fails fast on an invalid cron expression.
pub fn spawn<S>(sweeper: Arc<Sweeper<S>>, schedule: SweepSchedule) -> anyhow::Result<ScheduleHandle>
where
    S: SampleStore + 'static,
{
    let cron_schedule = cron::Schedule::from_str(&schedule.cron)
        .map_err(|e| anyhow::anyhow!("invalid sweep schedule {:?}: {}", schedule.cron, e))?;
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let join = tokio::spawn(run(sweeper, schedule, cron_schedule, cancel_rx));
    Ok(ScheduleHandle {
        cancel_tx: Some(cancel_tx),
        join,
    })
}

#[instrument(skip_all, fields(cron = %schedule.cron, utc_offset = %schedule.utc_offset))]
async fn run<S>(
    sweeper: Arc<Sweeper<S>>,
    schedule: SweepSchedule,
    cron_schedule: cron::Schedule,
    mut cancel_rx: oneshot::Receiver<()>,
) where
    S: SampleStore + 'static,
{
    if schedule.run_on_start {
        run_once(&sweeper, &schedule).await;
    }

    loop {
        let now = Utc::now();
        let Some(next) = next_run_after(&cron_schedule, schedule.utc_offset, now) else {
            warn!("sweep schedule has no upcoming run; stopping");
            break;
        };
        let delay = (next.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::from_secs(1));
        debug!(next = %next, "next retention sweep scheduled");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                run_once(&sweeper, &schedule).await;
            }
            _ = &mut cancel_rx => {
                debug!("sweep scheduler shutting down");
                break;
            }
        }
    }
}

async fn run_once<S: SampleStore>(sweeper: &Sweeper<S>, schedule: &SweepSchedule) {
    let report = sweeper.sweep().await;
    if schedule.vacuum_after_sweep && report.deleted > 0 && !sweeper.config.dry_run {
        if let Err(e) = sweeper.store.compact().await {
            warn!(error = %e, "vacuum failed");
        } else {
            info!("vacuum complete");
        }
    }
}
