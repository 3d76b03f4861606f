// Schema normalizer: minute record + metric -> zero or one canonical point.
//
// Documents come in a closed set of schema variants. Each variant knows how to pull a
// point for a metric; variants are tried in a fixed order and the first complete point
// wins. There is no fallback to zero values or to the wall clock.

use crate::models::{CanonicalPoint, Metric, MinuteRecord, RecordTimestamp};

/// Known minute-record shapes, in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    /// Top-level average fields (`avg`, `avgA`/`avg_current`, `avgL`/`avg_level`, `avg_cycles`).
    FlatAggregate,
    /// Per-metric objects from the minute uploader (`temp: {avg, min, max, last}`).
    NestedAggregate,
    /// `samples: [{t, v}, ...]`; the first sample represents the minute.
    SampleSeries,
}

impl SchemaVariant {
    pub const RESOLUTION_ORDER: [SchemaVariant; 3] = [
        SchemaVariant::FlatAggregate,
        SchemaVariant::NestedAggregate,
        SchemaVariant::SampleSeries,
    ];

    /// Point for `metric` under this variant alone, or `None` if the record does not
    /// carry a complete value + timestamp in this shape.
    pub fn resolve(self, record: &MinuteRecord, metric: Metric) -> Option<CanonicalPoint> {
        match self {
            SchemaVariant::FlatAggregate => {
                let v = record.flat_value(metric)?;
                let t = record.record_timestamp().millis()?;
                Some(CanonicalPoint { t, v })
            }
            SchemaVariant::NestedAggregate => {
                let agg = record.nested.get(&metric)?;
                let v = agg.avg.or(agg.last)?;
                let t = record.record_timestamp().millis()?;
                Some(CanonicalPoint { t, v })
            }
            SchemaVariant::SampleSeries => {
                // TODO: averaging every sample in the minute would represent bucket variance
                // better; keep first-sample until uploaders confirm which they expect.
                let first = record.samples.first()?;
                let v = first.v?;
                let t = first.t.millis()?;
                Some(CanonicalPoint { t, v })
            }
        }
    }
}

/// Why a record contributed nothing to a metric's series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Unresolved {
    #[error("record has no usable value for the metric")]
    NoValue,
    #[error("record timestamp is present but not parseable")]
    MalformedTimestamp,
}

/// Resolve `record` for `metric`, reporting which variant matched.
pub fn resolve(
    record: &MinuteRecord,
    metric: Metric,
) -> Result<(SchemaVariant, CanonicalPoint), Unresolved> {
    if let RecordTimestamp::Malformed(raw) = record.record_timestamp() {
        tracing::debug!(record = %record.id, raw = %raw, "malformed record timestamp");
        return Err(Unresolved::MalformedTimestamp);
    }
    SchemaVariant::RESOLUTION_ORDER
        .iter()
        .find_map(|variant| variant.resolve(record, metric).map(|p| (*variant, p)))
        .ok_or(Unresolved::NoValue)
}

pub fn normalize(record: &MinuteRecord, metric: Metric) -> Option<CanonicalPoint> {
    resolve(record, metric).ok().map(|(_, point)| point)
}
