//! Mapping of metrics onto primary and tag index rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::PublishResult;
use crate::metric::Metric;
use crate::tags::TagIndexSpec;
use crate::value::{normalize, NormalizedValue, ValueType};

/// Row in the primary metrics table, partitioned by `(ns, ver, host)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub ns: String,
    pub ver: i32,
    pub host: String,
    pub time: DateTime<Utc>,
    pub value: NormalizedValue,
    pub tags: HashMap<String, String>,
}

/// Row in the tag index table, partitioned by `(key, val)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRow {
    pub key: String,
    pub val: String,
    pub row: MetricRow,
}

impl MetricRow {
    /// Build the primary row for a metric whose value is already normalized
    pub fn new(metric: &Metric, value: NormalizedValue) -> Self {
        Self {
            ns: metric.namespace.key(),
            ver: metric.version,
            host: metric.source.clone(),
            time: metric.timestamp,
            value,
            tags: metric.tags.clone(),
        }
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    /// Timestamp as stored by the `timestamp` CQL type
    pub fn time_millis(&self) -> i64 {
        self.time.timestamp_millis()
    }

    pub fn double_val(&self) -> Option<f64> {
        self.value.as_double()
    }

    pub fn str_val(&self) -> Option<&str> {
        self.value.as_text()
    }

    pub fn bool_val(&self) -> Option<bool> {
        self.value.as_bool()
    }
}

/// Every row one metric produces
#[derive(Debug, Clone, PartialEq)]
pub struct MappedMetric {
    pub primary: MetricRow,
    pub tag_rows: Vec<TagRow>,
}

/// Turns metrics into rows for the configured tag index
#[derive(Debug, Clone, Default)]
pub struct RowMapper {
    tag_index: TagIndexSpec,
}

impl RowMapper {
    pub fn new(tag_index: TagIndexSpec) -> Self {
        Self { tag_index }
    }

    pub fn tag_index(&self) -> &TagIndexSpec {
        &self.tag_index
    }

    /// Normalize the metric value and build its rows.
    ///
    /// Fails with `InvalidDataType` when the value cannot be stored, in which
    /// case no row at all is produced for the metric.
    pub fn map(&self, metric: &Metric) -> PublishResult<MappedMetric> {
        let value = normalize(&metric.data)?;
        let primary = MetricRow::new(metric, value);
        let tag_rows = self.tag_rows(&primary);
        Ok(MappedMetric { primary, tag_rows })
    }

    /// One tag row per index-eligible key present on the row's tags
    pub fn tag_rows(&self, primary: &MetricRow) -> Vec<TagRow> {
        if self.tag_index.is_empty() {
            return Vec::new();
        }

        self.tag_index
            .select(&primary.tags)
            .into_iter()
            .filter_map(|key| {
                primary.tags.get(key).map(|val| TagRow {
                    key: key.to_string(),
                    val: val.clone(),
                    row: primary.clone(),
                })
            })
            .collect()
    }
}
