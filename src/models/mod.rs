// Domain models

mod alert;
mod metric;
mod record;
mod series;

pub use alert::{AlertRecord, AlertState, LatestSnapshot};
pub use metric::{Metric, UnknownMetric};
pub use record::{MinuteRecord, NestedAggregate, RecordTimestamp, Sample, coerce_number};
pub use series::{CanonicalPoint, ChartSeries};
