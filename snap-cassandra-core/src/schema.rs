//! Cassandra schema and statement definitions for the metrics tables

use crate::error::{PublishError, PublishResult};
use crate::value::ValueType;

/// Default keyspace name
pub const DEFAULT_KEYSPACE: &str = "snap";

/// Default primary table name
pub const DEFAULT_TABLE: &str = "metrics";

/// Name of the tag index table, always created next to the primary table
pub const TAG_TABLE: &str = "tags";

/// Replication factor used when the publisher creates the keyspace
pub const REPLICATION_FACTOR: u32 = 1;

/// Keyspace and primary table the publisher writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSchema {
    pub keyspace: String,
    pub table: String,
}

impl Default for MetricsSchema {
    fn default() -> Self {
        Self {
            keyspace: DEFAULT_KEYSPACE.to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

/// Keyspace and table names are interpolated into CQL, so only plain identifiers pass
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl MetricsSchema {
    /// Create a new schema definition
    pub fn new<K: Into<String>, T: Into<String>>(keyspace: K, table: T) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
        }
    }

    /// Validate schema configuration
    pub fn validate(&self) -> PublishResult<()> {
        if !is_valid_identifier(&self.keyspace) {
            return Err(PublishError::configuration(format!(
                "Invalid keyspace name '{}'",
                self.keyspace
            )));
        }

        if !is_valid_identifier(&self.table) {
            return Err(PublishError::configuration(format!(
                "Invalid table name '{}'",
                self.table
            )));
        }

        if self.table == TAG_TABLE {
            return Err(PublishError::configuration(format!(
                "Table name '{}' is reserved for the tag index",
                TAG_TABLE
            )));
        }

        Ok(())
    }

    /// Generate CQL for creating the keyspace
    pub fn create_keyspace_cql(&self) -> String {
        format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = {{'class': 'SimpleStrategy', 'replication_factor': {}}};",
            self.keyspace, REPLICATION_FACTOR
        )
    }

    /// Generate CQL for creating the primary metrics table
    pub fn create_metrics_table_cql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (\
             ns text, ver int, host text, time timestamp, \
             valType text, doubleVal double, strVal text, boolVal boolean, \
             tags map<text,text>, \
             PRIMARY KEY ((ns, ver, host), time)\
             ) WITH CLUSTERING ORDER BY (time DESC);",
            self.keyspace, self.table
        )
    }

    /// Generate CQL for creating the tag index table
    pub fn create_tags_table_cql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (\
             key text, val text, time timestamp, \
             ns text, ver int, host text, \
             valType text, doubleVal double, strVal text, boolVal boolean, \
             tags map<text,text>, \
             PRIMARY KEY ((key, val), time, ns, ver, host)\
             ) WITH CLUSTERING ORDER BY (time DESC);",
            self.keyspace, TAG_TABLE
        )
    }

    /// Table DDL in creation order. The keyspace statement is separate since
    /// creating it is optional.
    pub fn create_tables_cql(&self) -> Vec<String> {
        vec![self.create_metrics_table_cql(), self.create_tags_table_cql()]
    }

    /// Every DDL statement run when a session opens, in order. The keyspace
    /// is only created when `create_keyspace` is set; both tables always are.
    pub fn provisioning_cql(&self, create_keyspace: bool) -> Vec<String> {
        let mut statements = Vec::with_capacity(3);
        if create_keyspace {
            statements.push(self.create_keyspace_cql());
        }
        statements.extend(self.create_tables_cql());
        statements
    }

    /// Insert into the primary table, binding
    /// `(ns, ver, host, time, valType, <value>, tags)`
    pub fn insert_metric_cql(&self, value_type: ValueType) -> String {
        format!(
            "INSERT INTO {}.{} (ns, ver, host, time, valType, {}, tags) VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.keyspace,
            self.table,
            value_type.column()
        )
    }

    /// Insert into the tag index table, binding
    /// `(key, val, time, ns, ver, host, valType, <value>, tags)`
    pub fn insert_tag_cql(&self, value_type: ValueType) -> String {
        format!(
            "INSERT INTO {}.{} (key, val, time, ns, ver, host, valType, {}, tags) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.keyspace,
            TAG_TABLE,
            value_type.column()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema() {
        let schema = MetricsSchema::default();
        assert_eq!(schema.keyspace, "snap");
        assert_eq!(schema.table, "metrics");
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_identifiers() {
        assert!(MetricsSchema::new("snap; DROP", "metrics").validate().is_err());
        assert!(MetricsSchema::new("snap", "").validate().is_err());
        assert!(MetricsSchema::new("snap", "tags").validate().is_err());
        assert!(MetricsSchema::new("snap_2", "metrics_v2").validate().is_ok());
    }

    #[test]
    fn test_keyspace_cql() {
        let cql = MetricsSchema::new("telemetry", "metrics").create_keyspace_cql();
        assert_eq!(
            cql,
            "CREATE KEYSPACE IF NOT EXISTS telemetry WITH REPLICATION = {'class': 'SimpleStrategy', 'replication_factor': 1};"
        );
    }

    #[test]
    fn test_insert_cql_selects_value_column() {
        let schema = MetricsSchema::default();
        assert_eq!(
            schema.insert_metric_cql(ValueType::Boolean),
            "INSERT INTO snap.metrics (ns, ver, host, time, valType, boolVal, tags) VALUES (?, ?, ?, ?, ?, ?, ?)"
        );
        assert!(schema
            .insert_tag_cql(ValueType::Double)
            .starts_with("INSERT INTO snap.tags (key, val, time, ns, ver, host, valType, doubleVal, tags)"));
    }
}
