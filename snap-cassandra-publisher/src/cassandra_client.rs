//! Cassandra store using the ScyllaDB Rust driver
//!
//! Opens the session described by [`ClientOptions`], provisions the keyspace
//! and tables, and writes rows through prepared statements chosen by the
//! value type of each row.

use async_trait::async_trait;
use parking_lot::RwLock;
use snap_cassandra_core::{
    error::{PublishError, PublishResult},
    rows::{MetricRow, TagRow},
    schema::MetricsSchema,
    value::{NormalizedValue, ValueType},
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{debug, error, info};

// ScyllaDB Rust driver imports
use scylla::client::execution_profile::ExecutionProfile;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::errors::TranslationError;
use scylla::policies::address_translator::{AddressTranslator, UntranslatedPeer};
use scylla::policies::host_filter::AllowListHostFilter;
use scylla::statement::prepared::PreparedStatement;
use scylla::statement::Consistency;
use scylla::value::CqlTimestamp;

use openssl::ssl::{SslContext, SslContextBuilder, SslFiletype, SslMethod, SslVerifyMode};

use crate::config::{ClientOptions, SslOptions, TrustMode};
use crate::store::{MetricStore, SharedMetricStore, StoreConnector, StoreStats};

/// Native protocol revision spoken to the cluster. The driver only
/// negotiates v4, so this is informational.
pub const PROTOCOL_VERSION: u8 = 4;

/// Writes are acknowledged by a single replica
pub const WRITE_CONSISTENCY: Consistency = Consistency::One;

/// Sends every peer to the configured contact address, for clusters that
/// advertise addresses unreachable from the publisher (NAT, containers).
struct ContactPointTranslator {
    contact_addr: SocketAddr,
}

#[async_trait]
impl AddressTranslator for ContactPointTranslator {
    async fn translate_address(
        &self,
        untranslated_peer: &UntranslatedPeer,
    ) -> Result<SocketAddr, TranslationError> {
        debug!(
            "Translating peer {} to contact point {}",
            untranslated_peer.untranslated_address(),
            self.contact_addr
        );
        Ok(self.contact_addr)
    }
}

/// Prepared inserts, one per value type and table
struct InsertStatements {
    metrics: HashMap<ValueType, PreparedStatement>,
    tags: HashMap<ValueType, PreparedStatement>,
}

impl InsertStatements {
    async fn prepare(session: &Session, schema: &MetricsSchema) -> PublishResult<Self> {
        debug!("Preparing insert statements");

        let mut metrics = HashMap::new();
        let mut tags = HashMap::new();

        for value_type in ValueType::ALL {
            let metric_stmt = session
                .prepare(schema.insert_metric_cql(value_type))
                .await
                .map_err(|e| {
                    PublishError::session(format!(
                        "Failed to prepare {} metrics statement: {}",
                        value_type, e
                    ))
                })?;
            metrics.insert(value_type, metric_stmt);

            let tag_stmt = session
                .prepare(schema.insert_tag_cql(value_type))
                .await
                .map_err(|e| {
                    PublishError::session(format!(
                        "Failed to prepare {} tags statement: {}",
                        value_type, e
                    ))
                })?;
            tags.insert(value_type, tag_stmt);
        }

        debug!("All insert statements prepared successfully");
        Ok(Self { metrics, tags })
    }

    fn metric(&self, value_type: ValueType) -> PublishResult<&PreparedStatement> {
        self.metrics.get(&value_type).ok_or_else(|| {
            PublishError::store(format!("No metrics statement for {}", value_type))
        })
    }

    fn tag(&self, value_type: ValueType) -> PublishResult<&PreparedStatement> {
        self.tags
            .get(&value_type)
            .ok_or_else(|| PublishError::store(format!("No tags statement for {}", value_type)))
    }
}

/// Internal statistics tracking
#[derive(Default)]
struct CassandraStoreStats {
    total_queries: AtomicU64,
    failed_queries: AtomicU64,
    metric_rows: AtomicU64,
    tag_rows: AtomicU64,
}

/// Production store backed by one ScyllaDB driver session
pub struct CassandraStore {
    session: RwLock<Option<Arc<Session>>>,
    statements: InsertStatements,
    stats: CassandraStoreStats,
}

/// Build the client TLS context for the configured trust mode
fn build_tls_context(ssl: &SslOptions) -> PublishResult<SslContext> {
    let tls_error = |what: &str, e: openssl::error::ErrorStack| {
        PublishError::session(format!("Failed to {}: {}", what, e))
    };

    let mut builder =
        SslContextBuilder::new(SslMethod::tls()).map_err(|e| tls_error("create TLS context", e))?;

    if let Some(ca_path) = &ssl.ca_path {
        builder
            .set_ca_file(ca_path)
            .map_err(|e| tls_error("load CA certificate", e))?;
    }

    if let Some((cert_path, key_path)) = ssl.client_identity() {
        builder
            .set_certificate_file(cert_path, SslFiletype::PEM)
            .map_err(|e| tls_error("load client certificate", e))?;
        builder
            .set_private_key_file(key_path, SslFiletype::PEM)
            .map_err(|e| tls_error("load client key", e))?;
    }

    match ssl.trust_mode() {
        TrustMode::Verified => builder.set_verify(SslVerifyMode::PEER),
        TrustMode::Unverified => builder.set_verify(SslVerifyMode::NONE),
    }

    Ok(builder.build())
}

async fn resolve_contact_point(contact_point: &str) -> PublishResult<SocketAddr> {
    tokio::net::lookup_host(contact_point)
        .await
        .map_err(|e| {
            PublishError::session(format!("Failed to resolve {}: {}", contact_point, e))
        })?
        .next()
        .ok_or_else(|| PublishError::session(format!("No address found for {}", contact_point)))
}

impl CassandraStore {
    /// Open a session and provision the schema.
    ///
    /// Every failure here is a [`PublishError::Session`].
    pub async fn connect(options: &ClientOptions) -> PublishResult<Self> {
        let contact_point = options.contact_point();
        info!(
            "Initializing ScyllaDB session with contact point: {}",
            contact_point
        );

        let mut profile = ExecutionProfile::builder().consistency(WRITE_CONSISTENCY);
        if let Some(timeout) = options.timeout {
            profile = profile.request_timeout(Some(timeout));
        }

        let mut session_builder = SessionBuilder::new()
            .known_node(&contact_point)
            .default_execution_profile_handle(profile.build().into_handle());

        if let Some(connection_timeout) = options.connection_timeout {
            session_builder = session_builder.connection_timeout(connection_timeout);
        }

        if !options.initial_host_lookup {
            debug!("Peer discovery disabled, restricting pools to {}", contact_point);
            let filter = AllowListHostFilter::new([contact_point.as_str()]).map_err(|e| {
                PublishError::session(format!("Invalid contact point {}: {}", contact_point, e))
            })?;
            session_builder = session_builder.host_filter(Arc::new(filter));
        }

        if options.ignore_peer_addr {
            let contact_addr = resolve_contact_point(&contact_point).await?;
            debug!("Ignoring advertised peer addresses in favor of {}", contact_addr);
            let translator = ContactPointTranslator { contact_addr };
            session_builder = session_builder.address_translator(Arc::new(translator));
        }

        if let Some(ssl) = &options.ssl {
            if let Some((username, password)) = ssl.credentials() {
                session_builder = session_builder.user(username, password);
            }
            session_builder = session_builder.tls_context(Some(build_tls_context(ssl)?));
        }

        let session = session_builder.build().await.map_err(|e| {
            PublishError::session(format!("Failed to create ScyllaDB session: {}", e))
        })?;

        info!("ScyllaDB session established successfully");

        let schema = options.schema();
        Self::ensure_schema(&session, &schema, options.create_keyspace).await?;
        let statements = InsertStatements::prepare(&session, &schema).await?;

        Ok(Self {
            session: RwLock::new(Some(Arc::new(session))),
            statements,
            stats: CassandraStoreStats::default(),
        })
    }

    /// Create the keyspace (when asked to) and both tables
    async fn ensure_schema(
        session: &Session,
        schema: &MetricsSchema,
        create_keyspace: bool,
    ) -> PublishResult<()> {
        info!("Initializing metrics schema in keyspace {}", schema.keyspace);

        for cql in schema.provisioning_cql(create_keyspace) {
            debug!("Executing schema statement: {}", cql);
            session.query_unpaged(cql.as_str(), ()).await.map_err(|e| {
                error!("Schema statement failed: {}", e);
                PublishError::session(format!("Schema statement failed: {}", e))
            })?;
        }

        info!("Metrics schema initialized successfully");
        Ok(())
    }

    fn session(&self) -> PublishResult<Arc<Session>> {
        self.session.read().clone().ok_or(PublishError::Closed)
    }

    fn record<T, E: std::fmt::Display>(
        &self,
        table: &str,
        result: Result<T, E>,
    ) -> PublishResult<()> {
        self.stats.total_queries.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.stats.failed_queries.fetch_add(1, Ordering::Relaxed);
                error!(table, error = %e, "Cassandra client insertion error");
                Err(PublishError::store(format!("insert into {} failed: {}", table, e)))
            }
        }
    }
}

#[async_trait]
impl MetricStore for CassandraStore {
    async fn write_metric(&self, row: &MetricRow) -> PublishResult<()> {
        let session = self.session()?;
        let value_type = row.value_type();
        let stmt = self.statements.metric(value_type)?;
        let time = CqlTimestamp(row.time_millis());
        let label = value_type.label();

        debug!(namespace = %row.ns, "Writing {} metric row", value_type);

        let result = match &row.value {
            NormalizedValue::Double(v) => {
                session
                    .execute_unpaged(
                        stmt,
                        (&row.ns, row.ver, &row.host, time, label, *v, &row.tags),
                    )
                    .await
            }
            NormalizedValue::Text(v) => {
                session
                    .execute_unpaged(
                        stmt,
                        (&row.ns, row.ver, &row.host, time, label, v.as_str(), &row.tags),
                    )
                    .await
            }
            NormalizedValue::Boolean(v) => {
                session
                    .execute_unpaged(
                        stmt,
                        (&row.ns, row.ver, &row.host, time, label, *v, &row.tags),
                    )
                    .await
            }
        };

        self.record("metrics", result)?;
        self.stats.metric_rows.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn write_tag(&self, tag_row: &TagRow) -> PublishResult<()> {
        let session = self.session()?;
        let row = &tag_row.row;
        let value_type = row.value_type();
        let stmt = self.statements.tag(value_type)?;
        let time = CqlTimestamp(row.time_millis());
        let label = value_type.label();

        debug!(key = %tag_row.key, val = %tag_row.val, "Writing {} tag row", value_type);

        let result = match &row.value {
            NormalizedValue::Double(v) => {
                session
                    .execute_unpaged(
                        stmt,
                        (
                            &tag_row.key,
                            &tag_row.val,
                            time,
                            &row.ns,
                            row.ver,
                            &row.host,
                            label,
                            *v,
                            &row.tags,
                        ),
                    )
                    .await
            }
            NormalizedValue::Text(v) => {
                session
                    .execute_unpaged(
                        stmt,
                        (
                            &tag_row.key,
                            &tag_row.val,
                            time,
                            &row.ns,
                            row.ver,
                            &row.host,
                            label,
                            v.as_str(),
                            &row.tags,
                        ),
                    )
                    .await
            }
            NormalizedValue::Boolean(v) => {
                session
                    .execute_unpaged(
                        stmt,
                        (
                            &tag_row.key,
                            &tag_row.val,
                            time,
                            &row.ns,
                            row.ver,
                            &row.host,
                            label,
                            *v,
                            &row.tags,
                        ),
                    )
                    .await
            }
        };

        self.record("tags", result)?;
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
        // In-flight writes hold their own handle; the session is dropped with the last one
        if self.session.write().take().is_some() {
            info!("Cassandra session closed");
        }
    }
}

/// Connector that opens [`CassandraStore`] sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct CassandraConnector;

#[async_trait]
impl StoreConnector for CassandraConnector {
    async fn connect(&self, options: &ClientOptions) -> PublishResult<SharedMetricStore> {
        let store = CassandraStore::connect(options).await?;
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_unverified_tls_context_without_files() {
        let ssl = SslOptions {
            username: String::new(),
            password: String::new(),
            key_path: None,
            cert_path: None,
            ca_path: None,
            server_cert_verification: false,
        };
        assert!(build_tls_context(&ssl).is_ok());
    }

    #[test]
    fn test_missing_ca_file_is_session_error() {
        let ssl = SslOptions {
            username: String::new(),
            password: String::new(),
            key_path: None,
            cert_path: None,
            ca_path: Some(PathBuf::from("/nonexistent/ca.pem")),
            server_cert_verification: true,
        };
        let err = build_tls_context(&ssl).err().unwrap();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_resolve_contact_point() {
        let addr = resolve_contact_point("127.0.0.1:9042").await.unwrap();
        assert_eq!(addr, "127.0.0.1:9042".parse::<SocketAddr>().unwrap());
    }
}
