// History fetcher: store query -> normalize -> chronological sort -> downsample.
// One store query per call; everything after the query is local and side-effect free.
// A failed or timed-out query yields an empty series marked offline, never a partial one.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::downsample::{TierPolicy, downsample};
use crate::models::{CanonicalPoint, ChartSeries, Metric, MinuteRecord};
use crate::normalizer::{self, Unresolved};
use crate::sample_store::{SampleStore, with_timeout};

const MS_PER_HOUR: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Online,
    /// The store could not be reached; the series is empty, not partial.
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub device_id: String,
    pub metric: Metric,
    pub hours_back: u32,
    pub max_points: usize,
    pub status: FetchStatus,
    /// Source records that produced a point.
    pub records_used: usize,
    /// Records in the window with no usable value for the metric.
    pub unresolved: usize,
    /// Records excluded because their timestamp could not be parsed.
    pub malformed: usize,
    pub series: ChartSeries,
}

/// Outcome of normalizing and downsampling one batch of records.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltSeries {
    pub series: ChartSeries,
    pub records_used: usize,
    pub unresolved: usize,
    pub malformed: usize,
}

/// Normalize `records` for `metric`, order points oldest-first and cap at `max_points`.
pub fn build_series(records: &[MinuteRecord], metric: Metric, max_points: usize) -> BuiltSeries {
    let mut points: Vec<CanonicalPoint> = Vec::with_capacity(records.len());
    let mut unresolved = 0;
    let mut malformed = 0;
    for record in records {
        match normalizer::resolve(record, metric) {
            Ok((_, point)) => points.push(point),
            Err(Unresolved::NoValue) => unresolved += 1,
            Err(Unresolved::MalformedTimestamp) => malformed += 1,
        }
    }
    // Stable: equal timestamps keep store order.
    points.sort_by_key(|p| p.t);

    let values: Vec<f64> = points.iter().map(|p| p.v).collect();
    BuiltSeries {
        series: ChartSeries {
            values: downsample(&values, max_points),
            start_ms: points.first().map(|p| p.t),
            end_ms: points.last().map(|p| p.t),
        },
        records_used: points.len(),
        unresolved,
        malformed,
    }
}

pub struct HistoryFetcher<S> {
    store: Arc<S>,
    tiers: TierPolicy,
    query_timeout: Duration,
}

impl<S: SampleStore> HistoryFetcher<S> {
    pub fn new(store: Arc<S>, tiers: TierPolicy, query_timeout: Duration) -> Self {
        Self {
            store,
            tiers,
            query_timeout,
        }
    }

    pub async fn fetch(&self, device_id: &str, metric: Metric, hours_back: u32) -> FetchResult {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.fetch_at(device_id, metric, hours_back, now_ms).await
    }

    /// Series for `[now_ms - hours_back, now_ms]`.
    #[instrument(skip(self, device_id), fields(device = %device_id, metric = %metric))]
    pub async fn fetch_at(
        &self,
        device_id: &str,
        metric: Metric,
        hours_back: u32,
        now_ms: i64,
    ) -> FetchResult {
        let from_ms = now_ms - (hours_back as i64) * MS_PER_HOUR;
        let max_points = self.tiers.points_for(hours_back);
        let mut result = FetchResult {
            device_id: device_id.to_string(),
            metric,
            hours_back,
            max_points,
            status: FetchStatus::Offline,
            records_used: 0,
            unresolved: 0,
            malformed: 0,
            series: ChartSeries::empty(),
        };

        let records = match with_timeout(
            self.query_timeout,
            self.store.query_created_between(device_id, from_ms, now_ms),
        )
        .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "history query failed, reporting offline");
                return result;
            }
        };

        let built = build_series(&records, metric, max_points);
        if built.unresolved > 0 || built.malformed > 0 {
            debug!(
                unresolved = built.unresolved,
                malformed = built.malformed,
                "records excluded from series"
            );
        }
        result.status = FetchStatus::Online;
        result.records_used = built.records_used;
        result.unresolved = built.unresolved;
        result.malformed = built.malformed;
        result.series = built.series;
        result
    }
}
