//! Cassandra Publisher Library
//!
//! Writes metric batches from a telemetry host into Cassandra, maintaining a
//! primary metrics table and an optional tag index table over one shared
//! driver session.

// Core modules
pub mod cassandra_client;
pub mod config;
pub mod metrics;
pub mod mock_client;
pub mod publisher;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use cassandra_client::{CassandraConnector, CassandraStore};
pub use config::{
    ClientOptions, ConfigMap, ConfigSchema, ConfigValue, PublisherSettings, SslOptions,
};
pub use publisher::{PluginMeta, Publisher};
pub use session::SessionManager;
pub use store::{MetricStore, SharedMetricStore, StoreConnector, StoreStats};
