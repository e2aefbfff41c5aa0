//! # Cassandra Publisher Core Library
//!
//! Domain types and pure logic for publishing telemetry metrics into Cassandra.
//!
//! ## Features
//!
//! - **Metrics**: metric records with namespace, version, host, tags and dynamic data
//! - **Values**: normalization of dynamic data into double, string or boolean columns
//! - **Rows**: mapping of metrics to primary table rows and tag index rows
//! - **Schema**: keyspace and table DDL plus per-value-type insert statements
//! - **Codec**: decoding of host batches by content type
//!
//! Nothing in this crate performs I/O; the publisher crate owns the driver
//! session and drives these types over each batch.

pub mod codec;
pub mod error;
pub mod metric;
pub mod rows;
pub mod schema;
pub mod tags;
pub mod value;

// Re-export commonly used types
pub use codec::{decode_batch, ContentType, JSON_CONTENT_TYPE};
pub use error::{PublishError, PublishResult};
pub use metric::{Metric, MetricData, Namespace};
pub use rows::{MappedMetric, MetricRow, RowMapper, TagRow};
pub use schema::MetricsSchema;
pub use tags::{select_index_keys, TagIndexSpec};
pub use value::{normalize, NormalizedValue, ValueType};

/// Version information for the publisher
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
