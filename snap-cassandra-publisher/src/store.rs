//! Metric store interface
//!
//! Abstraction over the backing store so the orchestrator can run against the
//! ScyllaDB driver in production and an in-memory store in tests.

use async_trait::async_trait;
use snap_cassandra_core::{
    error::PublishResult,
    rows::{MetricRow, TagRow},
};
use std::sync::Arc;

use crate::config::ClientOptions;

/// Statistics for store operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub total_queries: u64,
    pub failed_queries: u64,
    pub metric_rows_written: u64,
    pub tag_rows_written: u64,
}

/// An open, schema-provisioned session.
///
/// Implementations must allow concurrent writes through a shared reference.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Insert one row into the primary metrics table
    async fn write_metric(&self, row: &MetricRow) -> PublishResult<()>;

    /// Insert one row into the tag index table
    async fn write_tag(&self, row: &TagRow) -> PublishResult<()>;

    /// Get store statistics
    fn get_stats(&self) -> StoreStats;

    /// Release the underlying connections. Safe to call more than once.
    async fn close(&self);
}

/// Type alias for shared store trait object
pub type SharedMetricStore = Arc<dyn MetricStore>;

/// Opens a session and provisions the schema for a set of client options
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, options: &ClientOptions) -> PublishResult<SharedMetricStore>;
}
