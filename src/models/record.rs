// Minute record: typed view over one stored per-minute document.
// Field names drifted across uploader generations; this module reads every known
// spelling and leaves variant selection to the normalizer.

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::Metric;

/// Epoch numbers below this are seconds, at or above it millis (1e11 s is year 5138).
const EPOCH_SECONDS_LIMIT: f64 = 1e11;

const CREATED_AT_KEYS: [&str; 4] = ["createdAt", "created_at", "ts_minute", "timestamp"];
const UPLOADED_AT_KEYS: [&str; 2] = ["uploadedAt", "uploaded_at"];

/// A timestamp field as found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordTimestamp {
    Missing,
    /// Present but not parseable; carries the raw text for logs.
    Malformed(String),
    /// Epoch millis (UTC).
    Valid(i64),
}

impl RecordTimestamp {
    /// Parse a JSON timestamp: RFC 3339 / naive ISO-8601 (UTC) strings, epoch seconds or
    /// millis, or a Firestore `{seconds, nanoseconds}` object. `null` counts as missing.
    pub fn from_value(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return RecordTimestamp::Missing;
        };
        let parsed = match value {
            Value::Null => return RecordTimestamp::Missing,
            Value::String(s) => parse_datetime_str(s),
            Value::Number(n) => n.as_f64().and_then(epoch_number_to_millis),
            Value::Object(obj) => parse_seconds_object(obj),
            _ => None,
        };
        match parsed {
            Some(ms) => RecordTimestamp::Valid(ms),
            None => RecordTimestamp::Malformed(value.to_string()),
        }
    }

    /// First present key wins; a malformed first key is not papered over by a later one.
    fn from_keys(doc: &Map<String, Value>, keys: &[&str]) -> Self {
        keys.iter()
            .map(|k| RecordTimestamp::from_value(doc.get(*k)))
            .find(RecordTimestamp::is_present)
            .unwrap_or(RecordTimestamp::Missing)
    }

    pub fn millis(&self) -> Option<i64> {
        match self {
            RecordTimestamp::Valid(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, RecordTimestamp::Missing)
    }
}

fn parse_datetime_str(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

fn epoch_number_to_millis(n: f64) -> Option<i64> {
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    let ms = if n < EPOCH_SECONDS_LIMIT { n * 1000.0 } else { n };
    Some(ms.round() as i64)
}

fn parse_seconds_object(obj: &Map<String, Value>) -> Option<i64> {
    let seconds = obj
        .get("seconds")
        .or_else(|| obj.get("_seconds"))
        .and_then(Value::as_i64)?;
    let nanos = obj
        .get("nanoseconds")
        .or_else(|| obj.get("_nanoseconds"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if seconds < 0 || !(0..1_000_000_000).contains(&nanos) {
        return None;
    }
    seconds
        .checked_mul(1000)?
        .checked_add(nanos / 1_000_000)
}

/// Coerce a JSON value into a finite number. Numeric strings are accepted; null, bools,
/// NaN/inf and anything else are absent.
pub fn coerce_number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Nested per-metric aggregate object (`temp: {avg, min, max, last}`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestedAggregate {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub last: Option<f64>,
}

impl NestedAggregate {
    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            avg: coerce_number(obj.get("avg")),
            min: coerce_number(obj.get("min")),
            max: coerce_number(obj.get("max")),
            last: coerce_number(obj.get("last")),
        }
    }
}

/// One `{t, v}` element of a record's `samples` sequence. `t` is epoch seconds on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub t: RecordTimestamp,
    pub v: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinuteRecord {
    pub id: String,
    pub created_at: RecordTimestamp,
    pub uploaded_at: RecordTimestamp,
    /// Numeric top-level average fields, keyed by their document name.
    pub flat: HashMap<&'static str, f64>,
    pub nested: HashMap<Metric, NestedAggregate>,
    pub samples: Vec<Sample>,
}

impl MinuteRecord {
    /// Read a stored document. Never fails: unknown or mistyped fields become absent.
    pub fn from_document(id: impl Into<String>, doc: &Map<String, Value>) -> Self {
        let mut flat = HashMap::new();
        let mut nested = HashMap::new();
        for metric in Metric::ALL {
            for key in metric.flat_keys() {
                if let Some(v) = coerce_number(doc.get(*key)) {
                    flat.insert(*key, v);
                }
            }
            if let Some(Value::Object(obj)) = doc.get(metric.nested_key()) {
                nested.insert(metric, NestedAggregate::from_object(obj));
            }
        }

        let samples = match doc.get("samples") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Object(s) => Sample {
                        t: RecordTimestamp::from_value(s.get("t")),
                        v: coerce_number(s.get("v")),
                    },
                    other => Sample {
                        t: RecordTimestamp::Malformed(other.to_string()),
                        v: None,
                    },
                })
                .collect(),
            _ => Vec::new(),
        };

        Self {
            id: id.into(),
            created_at: RecordTimestamp::from_keys(doc, &CREATED_AT_KEYS),
            uploaded_at: RecordTimestamp::from_keys(doc, &UPLOADED_AT_KEYS),
            flat,
            nested,
            samples,
        }
    }

    /// Timestamp charted for flat/nested values: `createdAt` family, else `uploadedAt` family.
    pub fn record_timestamp(&self) -> &RecordTimestamp {
        if self.created_at.is_present() {
            &self.created_at
        } else {
            &self.uploaded_at
        }
    }

    /// Epoch millis the record charts at: the record timestamp, else the first sample's
    /// `t`. `None` when the record timestamp is malformed or no time is known.
    pub fn charted_at_ms(&self) -> Option<i64> {
        match self.record_timestamp() {
            RecordTimestamp::Valid(ms) => Some(*ms),
            RecordTimestamp::Malformed(_) => None,
            RecordTimestamp::Missing => self.samples.first().and_then(|s| s.t.millis()),
        }
    }

    /// Timestamp that decides retention: `uploadedAt` family, else `createdAt` family.
    pub fn retention_timestamp(&self) -> &RecordTimestamp {
        if self.uploaded_at.is_present() {
            &self.uploaded_at
        } else {
            &self.created_at
        }
    }

    /// First numeric flat value for `metric`, honoring key order.
    pub fn flat_value(&self, metric: Metric) -> Option<f64> {
        metric
            .flat_keys()
            .iter()
            .find_map(|k| self.flat.get(k).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn iso_and_epoch_forms_agree() {
        let iso = RecordTimestamp::from_value(Some(&json!("2024-01-01T00:00:00Z")));
        let secs = RecordTimestamp::from_value(Some(&json!(1704067200)));
        let millis = RecordTimestamp::from_value(Some(&json!(1704067200000_i64)));
        let naive = RecordTimestamp::from_value(Some(&json!("2024-01-01T00:00:00")));
        let firestore = RecordTimestamp::from_value(Some(&json!({"_seconds": 1704067200, "_nanoseconds": 0})));
        for ts in [secs, millis, naive, firestore] {
            assert_eq!(ts, iso);
        }
        assert_eq!(iso.millis(), Some(1_704_067_200_000));
    }

    #[test]
    fn offset_timestamps_normalize_to_utc() {
        let ts = RecordTimestamp::from_value(Some(&json!("2024-01-01T07:00:00+07:00")));
        assert_eq!(ts.millis(), Some(1_704_067_200_000));
    }

    #[test]
    fn unparseable_values_are_malformed_not_missing() {
        for v in [json!("yesterday"), json!(true), json!(-5), json!([1, 2])] {
            assert!(matches!(
                RecordTimestamp::from_value(Some(&v)),
                RecordTimestamp::Malformed(_)
            ));
        }
        assert_eq!(RecordTimestamp::from_value(Some(&Value::Null)), RecordTimestamp::Missing);
        assert_eq!(RecordTimestamp::from_value(None), RecordTimestamp::Missing);
    }

    #[test]
    fn seconds_objects_out_of_range_are_malformed() {
        for v in [
            json!({"seconds": 9223372036854775_i64, "nanoseconds": i64::MAX}),
            json!({"seconds": i64::MAX}),
            json!({"seconds": -5}),
            json!({"_seconds": 1704067200, "_nanoseconds": -1}),
            json!({"seconds": 1704067200, "nanoseconds": 1_000_000_000}),
        ] {
            assert!(
                matches!(RecordTimestamp::from_value(Some(&v)), RecordTimestamp::Malformed(_)),
                "{}",
                v
            );
        }
        let ok = RecordTimestamp::from_value(Some(&json!({"seconds": 1704067200, "nanoseconds": 999_999_999})));
        assert_eq!(ok.millis(), Some(1_704_067_200_999));
    }

    #[test]
    fn charted_at_falls_back_to_upload_then_first_sample() {
        let doc = |v: Value| match v {
            Value::Object(m) => MinuteRecord::from_document("m", &m),
            _ => unreachable!(),
        };
        let uploaded = doc(json!({"uploaded_at": "2024-01-01T00:05:00Z", "avg": 1.0}));
        assert_eq!(uploaded.charted_at_ms(), Some(1_704_067_500_000));
        let sampled = doc(json!({"samples": [{"t": 1704067200, "v": 1.0}]}));
        assert_eq!(sampled.charted_at_ms(), Some(1_704_067_200_000));
        let bad = doc(json!({"createdAt": "soon", "samples": [{"t": 1704067200, "v": 1.0}]}));
        assert_eq!(bad.charted_at_ms(), None);
        assert_eq!(doc(json!({"avg": 1.0})).charted_at_ms(), None);
    }

    #[test]
    fn coerce_number_rejects_non_numeric() {
        assert_eq!(coerce_number(Some(&json!(1.5))), Some(1.5));
        assert_eq!(coerce_number(Some(&json!(" 42.5 "))), Some(42.5));
        assert_eq!(coerce_number(Some(&json!("NaN"))), None);
        assert_eq!(coerce_number(Some(&json!("inf"))), None);
        assert_eq!(coerce_number(Some(&json!("abc"))), None);
        assert_eq!(coerce_number(Some(&json!(false))), None);
        assert_eq!(coerce_number(Some(&Value::Null)), None);
        assert_eq!(coerce_number(None), None);
    }
}
