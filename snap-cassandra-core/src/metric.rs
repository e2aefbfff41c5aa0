//! Metric records as delivered by the telemetry host

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Separator used when a namespace is rendered as a storage key
pub const NAMESPACE_SEPARATOR: &str = "/";

/// Hierarchical metric identifier, e.g. `intel/psutil/load/load1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(Vec<String>);

impl Namespace {
    /// Create a namespace from its path segments
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a `/`-delimited namespace, ignoring empty segments
    pub fn parse(path: &str) -> Self {
        Self::new(path.split(NAMESPACE_SEPARATOR).filter(|s| !s.is_empty()))
    }

    /// The single string stored in the `ns` column
    pub fn key(&self) -> String {
        self.0.join(NAMESPACE_SEPARATOR)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Dynamically typed data carried by a metric.
///
/// Every primitive width the host may emit has its own variant so that the
/// normalizer can apply an explicit conversion per input representation.
/// Composite and null shapes are representable here but rejected on write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricData {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Text(String),
    List(Vec<MetricData>),
    Map(BTreeMap<String, MetricData>),
    Null,
}

impl MetricData {
    /// Short name of the data shape, used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            MetricData::I8(_) => "int8",
            MetricData::I16(_) => "int16",
            MetricData::I32(_) => "int32",
            MetricData::I64(_) => "int64",
            MetricData::U8(_) => "uint8",
            MetricData::U16(_) => "uint16",
            MetricData::U32(_) => "uint32",
            MetricData::U64(_) => "uint64",
            MetricData::F32(_) => "float32",
            MetricData::F64(_) => "float64",
            MetricData::Bool(_) => "bool",
            MetricData::Text(_) => "string",
            MetricData::List(_) => "list",
            MetricData::Map(_) => "map",
            MetricData::Null => "null",
        }
    }
}

impl fmt::Display for MetricData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(rendered) => f.write_str(&rendered),
            Err(_) => write!(f, "<{}>", self.kind()),
        }
    }
}

impl From<serde_json::Value> for MetricData {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => MetricData::Null,
            Value::Bool(b) => MetricData::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MetricData::I64(i)
                } else if let Some(u) = n.as_u64() {
                    MetricData::U64(u)
                } else {
                    // without arbitrary_precision every serde_json number fits in an f64
                    MetricData::F64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => MetricData::Text(s),
            Value::Array(items) => MetricData::List(items.into_iter().map(Into::into).collect()),
            Value::Object(fields) => MetricData::Map(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for MetricData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(MetricData::from)
    }
}

macro_rules! metric_data_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for MetricData {
                fn from(value: $ty) -> Self {
                    MetricData::$variant(value)
                }
            }
        )*
    };
}

metric_data_from! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    bool => Bool,
    String => Text,
}

impl From<&str> for MetricData {
    fn from(value: &str) -> Self {
        MetricData::Text(value.to_string())
    }
}

/// A single metric observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric namespace
    pub namespace: Namespace,

    /// Version of the collector that produced the metric
    #[serde(default)]
    pub version: i32,

    /// Host the metric was collected on
    #[serde(default)]
    pub source: String,

    /// Observation time
    pub timestamp: DateTime<Utc>,

    /// Free-form tags
    #[serde(default)]
    pub tags: HashMap<String, String>,

    /// Observed value
    pub data: MetricData,
}

impl Metric {
    /// Create a new metric with no tags
    pub fn new<D: Into<MetricData>>(
        namespace: Namespace,
        version: i32,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
        data: D,
    ) -> Self {
        Self {
            namespace,
            version,
            source: source.into(),
            timestamp,
            tags: HashMap::new(),
            data: data.into(),
        }
    }

    /// Add a tag to this metric
    pub fn with_tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}
