//! Metric points and batches written to the time-series store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tag set attached to a point.
///
/// The store protocol is schema-less, so tags stay plain string pairs.
pub type Tags = BTreeMap<String, String>;

/// A single measurement with one numeric `value` field.
///
/// Points are immutable once created. Timestamps have second precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Measurement name, e.g. `Download_Bytes`.
    pub measurement: String,

    /// Tags identifying the series.
    pub tags: Tags,

    /// The `value` field.
    pub value: u64,

    /// Unix timestamp in seconds.
    pub timestamp_secs: u64,
}

impl MetricPoint {
    /// Create a point stamped with the current time.
    pub fn new(measurement: impl Into<String>, tags: Tags, value: u64) -> Self {
        Self::with_timestamp(measurement, tags, value, current_timestamp_secs())
    }

    /// Create a point with an explicit timestamp.
    pub fn with_timestamp(
        measurement: impl Into<String>,
        tags: Tags,
        value: u64,
        timestamp_secs: u64,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            tags,
            value,
            timestamp_secs,
        }
    }

    /// Look up a tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Ordered points destined for one database.
///
/// A batch is the unit of queueing and of a single store write: it is either
/// delivered whole or dropped whole.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricBatch {
    /// Destination database.
    pub database: String,

    /// Points in emission order.
    pub points: Vec<MetricPoint>,
}

impl MetricBatch {
    /// Create an empty batch for a database.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            points: Vec::new(),
        }
    }

    /// Create a builder for constructing batches.
    pub fn builder(database: impl Into<String>) -> MetricBatchBuilder {
        MetricBatchBuilder::new(database)
    }

    /// Append a point.
    pub fn push(&mut self, point: MetricPoint) {
        self.points.push(point);
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the batch has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over points in order.
    pub fn iter(&self) -> impl Iterator<Item = &MetricPoint> {
        self.points.iter()
    }

    /// Points with the given measurement name.
    pub fn named<'a>(&'a self, measurement: &'a str) -> impl Iterator<Item = &'a MetricPoint> {
        self.points.iter().filter(move |p| p.measurement == measurement)
    }

    /// Value of the first point with the given measurement name.
    pub fn value_of(&self, measurement: &str) -> Option<u64> {
        self.named(measurement).next().map(|p| p.value)
    }
}

/// Builder for `MetricBatch` instances sharing one timestamp.
#[derive(Debug)]
pub struct MetricBatchBuilder {
    database: String,
    timestamp_secs: Option<u64>,
    points: Vec<MetricPoint>,
}

impl MetricBatchBuilder {
    /// Create a new builder.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            timestamp_secs: None,
            points: Vec::new(),
        }
    }

    /// Stamp every subsequent point with this time (seconds since Unix epoch).
    pub fn timestamp_secs(mut self, ts: u64) -> Self {
        self.timestamp_secs = Some(ts);
        self
    }

    /// Add a point.
    pub fn point(mut self, measurement: impl Into<String>, tags: Tags, value: u64) -> Self {
        let ts = *self.timestamp_secs.get_or_insert_with(current_timestamp_secs);
        self.points
            .push(MetricPoint::with_timestamp(measurement, tags, value, ts));
        self
    }

    /// Build the batch.
    pub fn build(self) -> MetricBatch {
        MetricBatch {
            database: self.database,
            points: self.points,
        }
    }
}

/// Get current timestamp in seconds since Unix epoch.
pub fn current_timestamp_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portal_tags() -> Tags {
        let mut tags = Tags::new();
        tags.insert("Captive Portal".to_string(), "lobby".to_string());
        tags
    }

    #[test]
    fn test_batch_builder_shares_timestamp() {
        let batch = MetricBatch::builder("nds")
            .timestamp_secs(1_604_700_000)
            .point("Authenticated", portal_tags(), 2)
            .point("PreAuth", portal_tags(), 1)
            .build();

        assert_eq!(batch.database, "nds");
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|p| p.timestamp_secs == 1_604_700_000));
        assert_eq!(batch.value_of("PreAuth"), Some(1));
        assert_eq!(batch.value_of("NdsError"), None);
    }

    #[test]
    fn test_builder_defaults_to_now() {
        let before = current_timestamp_secs();
        let batch = MetricBatch::builder("nds").point("NdsError", Tags::new(), 0).build();
        assert!(batch.points[0].timestamp_secs >= before);
    }

    #[test]
    fn test_point_tag_lookup() {
        let point = MetricPoint::with_timestamp("NdsError", portal_tags(), 1, 0);
        assert_eq!(point.tag("Captive Portal"), Some("lobby"));
        assert_eq!(point.tag("Mac_Address"), None);
    }

    #[test]
    fn test_named_preserves_order() {
        let mut batch = MetricBatch::new("nds");
        batch.push(MetricPoint::with_timestamp("Download_Bytes", Tags::new(), 1, 0));
        batch.push(MetricPoint::with_timestamp("Upload_Bytes", Tags::new(), 2, 0));
        batch.push(MetricPoint::with_timestamp("Download_Bytes", Tags::new(), 3, 0));

        let values: Vec<u64> = batch.named("Download_Bytes").map(|p| p.value).collect();
        assert_eq!(values, vec![1, 3]);
    }
}
