//! Mock Cassandra store for unit testing
//!
//! Provides an in-memory [`MetricStore`] and a [`StoreConnector`] handing
//! those stores out, so the publish path can be exercised without a
//! running Cassandra instance.

use async_trait::async_trait;
use parking_lot::Mutex;
use snap_cassandra_core::{
    error::{PublishError, PublishResult},
    rows::{MetricRow, TagRow},
};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, info, trace};

use crate::config::ClientOptions;
use crate::store::{MetricStore, SharedMetricStore, StoreConnector, StoreStats};

/// Simple in-memory storage for testing
#[derive(Debug, Default)]
struct MockStorage {
    metric_rows: Vec<MetricRow>,
    tag_rows: Vec<TagRow>,
    /// Track operations for testing
    operations: Vec<String>,
}

/// Statistics tracking for the mock store
#[derive(Debug, Default)]
struct MockStoreStats {
    total_queries: AtomicU64,
    failed_queries: AtomicU64,
    metric_rows: AtomicU64,
    tag_rows: AtomicU64,
}

/// In-memory store recording every row it is handed
#[derive(Debug, Default)]
pub struct MockStore {
    storage: Mutex<MockStorage>,
    stats: MockStoreStats,
    simulate_errors: bool,
    failing_namespaces: HashSet<String>,
    closed: AtomicBool,
}

impl MockStore {
    /// Create a new mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write
    pub fn with_error_simulation(mut self) -> Self {
        self.simulate_errors = true;
        self
    }

    /// Fail writes of rows whose namespace key is `ns`
    pub fn with_failing_namespace<S: Into<String>>(mut self, ns: S) -> Self {
        self.failing_namespaces.insert(ns.into());
        self
    }

    /// Primary rows written so far, in write order
    pub fn metric_rows(&self) -> Vec<MetricRow> {
        self.storage.lock().metric_rows.clone()
    }

    /// Tag rows written so far, in write order
    pub fn tag_rows(&self) -> Vec<TagRow> {
        self.storage.lock().tag_rows.clone()
    }

    /// Get the operation log (for testing)
    pub fn get_operations(&self) -> Vec<String> {
        self.storage.lock().operations.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_write(&self, table: &str, row: &MetricRow) -> PublishResult<()> {
        if self.is_closed() {
            return Err(PublishError::Closed);
        }

        self.stats.total_queries.fetch_add(1, Ordering::Relaxed);

        if self.simulate_errors || self.failing_namespaces.contains(&row.ns) {
            self.stats.failed_queries.fetch_add(1, Ordering::Relaxed);
            return Err(PublishError::store(format!(
                "Simulated {} write failure for {}",
                table, row.ns
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl MetricStore for MockStore {
    async fn write_metric(&self, row: &MetricRow) -> PublishResult<()> {
        self.check_write("metrics", row)?;
        trace!("Mock: Writing metric row {}", row.ns);

        let mut storage = self.storage.lock();
        storage
            .operations
            .push(format!("write_metric({}, {})", row.ns, row.value_type()));
        storage.metric_rows.push(row.clone());
        self.stats.metric_rows.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn write_tag(&self, tag_row: &TagRow) -> PublishResult<()> {
        self.check_write("tags", &tag_row.row)?;
        trace!("Mock: Writing tag row {}={}", tag_row.key, tag_row.val);

        let mut storage = self.storage.lock();
        storage.operations.push(format!(
            "write_tag({}={}, {})",
            tag_row.key, tag_row.val, tag_row.row.ns
        ));
        storage.tag_rows.push(tag_row.clone());
        self.stats.tag_rows.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn get_stats(&self) -> StoreStats {
        StoreStats {
            total_queries: self.stats.total_queries.load(Ordering::Relaxed),
            failed_queries: self.stats.failed_queries.load(Ordering::Relaxed),
            metric_rows_written: self.stats.metric_rows.load(Ordering::Relaxed),
            tag_rows_written: self.stats.tag_rows.load(Ordering::Relaxed),
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Mock store closed");
        }
    }
}

/// Connector producing [`MockStore`]s and recording how it was called
#[derive(Debug, Default)]
pub struct MockConnector {
    connect_calls: AtomicUsize,
    stores: Mutex<Vec<Arc<MockStore>>>,
    last_options: Mutex<Option<ClientOptions>>,
    fail_connect: bool,
    simulate_write_errors: bool,
    failing_namespaces: Vec<String>,
    connect_delay: Option<Duration>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connect attempt fails like an unreachable cluster
    pub fn with_connect_failure(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Stores handed out fail every write
    pub fn with_write_errors(mut self) -> Self {
        self.simulate_write_errors = true;
        self
    }

    /// Stores handed out fail writes for namespace `ns`
    pub fn with_failing_namespace<S: Into<String>>(mut self, ns: S) -> Self {
        self.failing_namespaces.push(ns.into());
        self
    }

    /// Sleep before connecting, widening the window for racing callers
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// The first store handed out, if any
    pub fn store(&self) -> Option<Arc<MockStore>> {
        self.stores.lock().first().cloned()
    }

    pub fn stores(&self) -> Vec<Arc<MockStore>> {
        self.stores.lock().clone()
    }

    /// Options passed to the most recent connect call
    pub fn last_options(&self) -> Option<ClientOptions> {
        self.last_options.lock().clone()
    }
}

#[async_trait]
impl StoreConnector for MockConnector {
    async fn connect(&self, options: &ClientOptions) -> PublishResult<SharedMetricStore> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(options.clone());

        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_connect {
            return Err(PublishError::session(format!(
                "Simulated connection failure to {}",
                options.contact_point()
            )));
        }

        info!("Mock: connected to {}", options.contact_point());

        let mut store = MockStore::new();
        if self.simulate_write_errors {
            store = store.with_error_simulation();
        }
        for ns in &self.failing_namespaces {
            store = store.with_failing_namespace(ns.clone());
        }

        let store = Arc::new(store);
        self.stores.lock().push(store.clone());
        Ok(store)
    }
}
