//! Publish orchestration
//!
//! [`Publisher`] is the entry point the host calls for every batch. It decodes
//! the payload, resolves configuration and opens the session on the first
//! call, then writes each metric and its tag index rows. Per-record failures
//! are collected and returned together once the whole batch has been tried.

use serde::Serialize;
use snap_cassandra_core::{
    codec::{decode_batch, ContentType},
    error::{PublishError, PublishResult},
    metric::Metric,
    rows::RowMapper,
};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::cassandra_client::CassandraConnector;
use crate::config::{ConfigMap, ConfigSchema, PublisherSettings};
use crate::metrics::{MetricsCollector, MetricsSnapshot, Timer};
use crate::session::SessionManager;
use crate::store::{SharedMetricStore, StoreConnector, StoreStats};

/// Name the publisher registers under
pub const PLUGIN_NAME: &str = "cassandra";

/// Version the publisher registers under
pub const PLUGIN_VERSION: i32 = 5;

/// Concurrent publish calls the host may route to one instance
pub const CONCURRENCY_COUNT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Publisher,
}

/// How the host spreads batches over running instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    LoadBalancing,
    /// Batches from one task always reach the same instance
    Sticky,
}

/// Static descriptor handed to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginMeta {
    pub name: &'static str,
    pub version: i32,
    pub kind: PluginKind,
    pub accepted_content_types: Vec<&'static str>,
    pub concurrency_count: usize,
    pub routing: RoutingStrategy,
}

/// Everything resolved on the first successful call
struct PublisherState {
    settings: PublisherSettings,
    store: SharedMetricStore,
    mapper: RowMapper,
}

/// Cassandra publisher
pub struct Publisher {
    sessions: SessionManager,
    state: OnceCell<PublisherState>,
    metrics: MetricsCollector,
}

impl Publisher {
    /// Create a publisher opening its session through `connector`
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            sessions: SessionManager::new(connector),
            state: OnceCell::new(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Create a publisher backed by a real Cassandra cluster
    pub fn cassandra() -> Self {
        Self::new(Arc::new(CassandraConnector))
    }

    pub fn metadata() -> PluginMeta {
        PluginMeta {
            name: PLUGIN_NAME,
            version: PLUGIN_VERSION,
            kind: PluginKind::Publisher,
            accepted_content_types: ContentType::ACCEPTED.iter().map(|ct| ct.as_str()).collect(),
            concurrency_count: CONCURRENCY_COUNT,
            routing: RoutingStrategy::Sticky,
        }
    }

    pub fn config_schema() -> ConfigSchema {
        ConfigSchema::publisher()
    }

    /// Publish one batch.
    ///
    /// Decode failures and configuration errors fail the call before any
    /// write. A session failure is returned as a fatal error. Otherwise every
    /// metric is attempted and the failures, if any, come back joined in
    /// [`PublishError::Batch`].
    pub async fn publish(
        &self,
        content_type: &str,
        payload: &[u8],
        config: &ConfigMap,
    ) -> PublishResult<()> {
        if self.sessions.is_closed() {
            return Err(PublishError::Closed);
        }

        let timer = Timer::start();

        let metrics = decode_batch(content_type, payload).map_err(|e| {
            error!(content_type, error = %e, "Failed to decode batch");
            self.metrics.record_error(&e);
            e
        })?;
        self.metrics.record_batch(metrics.len() as u64);

        let state = self.state(config).await?;

        debug!("Publishing {} metrics", metrics.len());

        let mut errors = Vec::new();
        for metric in &metrics {
            self.publish_metric(state, metric, &mut errors).await;
        }

        timer.finish(&self.metrics);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PublishError::Batch(errors))
        }
    }

    async fn state(&self, config: &ConfigMap) -> PublishResult<&PublisherState> {
        self.state
            .get_or_try_init(|| async {
                let settings = PublisherSettings::resolve(config).map_err(|e| {
                    error!(error = %e, "Invalid publisher configuration");
                    e
                })?;
                let store = self.sessions.get_session(&settings.options).await?;
                info!(
                    keyspace = %settings.options.keyspace,
                    table = %settings.options.table,
                    tag_index = ?settings.tag_index.keys(),
                    "Cassandra publisher initialized"
                );
                Ok::<_, PublishError>(PublisherState {
                    mapper: RowMapper::new(settings.tag_index.clone()),
                    settings,
                    store,
                })
            })
            .await
    }

    async fn publish_metric(
        &self,
        state: &PublisherState,
        metric: &Metric,
        errors: &mut Vec<String>,
    ) {
        let mapped = match state.mapper.map(metric) {
            Ok(mapped) => mapped,
            Err(e) => {
                error!(namespace = %metric.namespace, error = %e, "Skipping metric");
                self.record_failure(e, errors);
                return;
            }
        };

        // tag rows are still attempted when the primary row fails
        match state.store.write_metric(&mapped.primary).await {
            Ok(()) => self.metrics.increment_rows_written(),
            Err(e) => self.record_failure(e, errors),
        }

        for tag_row in &mapped.tag_rows {
            match state.store.write_tag(tag_row).await {
                Ok(()) => self.metrics.increment_tag_rows_written(),
                Err(e) => self.record_failure(e, errors),
            }
        }
    }

    fn record_failure(&self, error: PublishError, errors: &mut Vec<String>) {
        self.metrics.record_error(&error);
        errors.push(error.to_string());
    }

    /// Release the session. Idempotent; later publish calls fail with
    /// [`PublishError::Closed`].
    pub async fn close(&self) {
        self.sessions.close().await;
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized()
    }

    /// Settings resolved on the first successful call
    pub fn settings(&self) -> Option<&PublisherSettings> {
        self.state.get().map(|state| &state.settings)
    }

    pub fn stats(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn prometheus_metrics(&self) -> String {
        self.metrics.prometheus_format()
    }

    pub fn store_stats(&self) -> Option<StoreStats> {
        self.sessions.current().map(|store| store.get_stats())
    }
}
