//! Publisher configuration: accepted keys, typed extraction and connection options

use serde::{Deserialize, Serialize};
use snap_cassandra_core::{
    error::{PublishError, PublishResult},
    schema::{MetricsSchema, DEFAULT_KEYSPACE, DEFAULT_TABLE},
    tags::TagIndexSpec,
};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing::warn;
use validator::Validate;

pub const SERVER_KEY: &str = "server";
pub const PORT_KEY: &str = "port";
pub const SSL_KEY: &str = "ssl";
pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";
pub const KEY_PATH_KEY: &str = "keyPath";
pub const CERT_PATH_KEY: &str = "certPath";
pub const CA_PATH_KEY: &str = "caPath";
pub const SERVER_CERT_VERIFICATION_KEY: &str = "serverCertVerification";
pub const TIMEOUT_KEY: &str = "timeout";
pub const CONNECTION_TIMEOUT_KEY: &str = "connectionTimeout";
pub const TAG_INDEX_KEY: &str = "tagIndex";
pub const KEYSPACE_NAME_KEY: &str = "keyspaceName";
pub const CREATE_KEYSPACE_KEY: &str = "createKeyspace";
pub const TABLE_NAME_KEY: &str = "tableName";
pub const INITIAL_HOST_LOOKUP_KEY: &str = "initialHostLookup";
pub const IGNORE_PEER_ADDR_KEY: &str = "ignorePeerAddr";
pub const DEBUG_KEY: &str = "debug";
pub const LOG_LEVEL_KEY: &str = "log-level";

/// Default native protocol port
pub const DEFAULT_PORT: i64 = 9042;

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: i64 = 10;

/// Default connect timeout in seconds
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: i64 = 5;

/// A loosely typed configuration value as handed over by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

/// Configuration handed to every publish call
pub type ConfigMap = HashMap<String, ConfigValue>;

/// Declared type of a configuration key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    String,
    Integer,
    Bool,
}

impl ConfigValue {
    pub fn config_type(&self) -> ConfigType {
        match self {
            ConfigValue::Bool(_) => ConfigType::Bool,
            ConfigValue::Int(_) => ConfigType::Integer,
            ConfigValue::Str(_) => ConfigType::String,
        }
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigType::String => f.write_str("string"),
            ConfigType::Integer => f.write_str("integer"),
            ConfigType::Bool => f.write_str("bool"),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Str(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

/// Declaration of one accepted configuration key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigRule {
    pub key: &'static str,
    pub value_type: ConfigType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<ConfigValue>,
    pub description: &'static str,
}

impl ConfigRule {
    fn required(key: &'static str, value_type: ConfigType, description: &'static str) -> Self {
        Self {
            key,
            value_type,
            required: true,
            default: None,
            description,
        }
    }

    fn optional<V: Into<ConfigValue>>(
        key: &'static str,
        default: V,
        description: &'static str,
    ) -> Self {
        let default = default.into();
        Self {
            key,
            value_type: default.config_type(),
            required: false,
            default: Some(default),
            description,
        }
    }

    fn optional_without_default(
        key: &'static str,
        value_type: ConfigType,
        description: &'static str,
    ) -> Self {
        Self {
            key,
            value_type,
            required: false,
            default: None,
            description,
        }
    }
}

/// Every problem found while processing a configuration map
#[derive(Error, Debug, Clone, Default, PartialEq)]
#[error("{}", .errors.join("; "))]
pub struct ConfigErrors {
    pub errors: Vec<String>,
}

impl ConfigErrors {
    pub fn add_error<S: Into<String>>(&mut self, error: S) {
        self.errors.push(error.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl From<ConfigErrors> for PublishError {
    fn from(errors: ConfigErrors) -> Self {
        PublishError::Configuration(errors.to_string())
    }
}

/// The set of keys the publisher accepts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSchema {
    rules: Vec<ConfigRule>,
}

impl Default for ConfigSchema {
    fn default() -> Self {
        Self::publisher()
    }
}

impl ConfigSchema {
    /// Keys understood by the Cassandra publisher
    pub fn publisher() -> Self {
        Self {
            rules: vec![
                ConfigRule::required(SERVER_KEY, ConfigType::String, "Cassandra server"),
                ConfigRule::optional(
                    PORT_KEY,
                    DEFAULT_PORT,
                    "Cassandra server port, default: 9042",
                ),
                ConfigRule::optional(
                    SSL_KEY,
                    false,
                    "Not required, if true, use ssl options to connect to the Cassandra, default: false",
                ),
                ConfigRule::optional(
                    USERNAME_KEY,
                    "",
                    "Name of a user used to authenticate to Cassandra",
                ),
                ConfigRule::optional(
                    PASSWORD_KEY,
                    "",
                    "Password used to authenticate to the Cassandra",
                ),
                ConfigRule::optional(
                    KEY_PATH_KEY,
                    "",
                    "Path to the private key for the Cassandra client",
                ),
                ConfigRule::optional(
                    CERT_PATH_KEY,
                    "",
                    "Path to the self signed certificate for the Cassandra client",
                ),
                ConfigRule::optional(
                    CA_PATH_KEY,
                    "",
                    "Path to the CA certificate for the Cassandra server",
                ),
                ConfigRule::optional(
                    SERVER_CERT_VERIFICATION_KEY,
                    true,
                    "If true, verify a hostname and a server key, default: true",
                ),
                ConfigRule::optional(
                    TIMEOUT_KEY,
                    DEFAULT_TIMEOUT_SECS,
                    "Request timeout in seconds, 0 uses the driver default, default: 10",
                ),
                ConfigRule::optional(
                    CONNECTION_TIMEOUT_KEY,
                    DEFAULT_CONNECTION_TIMEOUT_SECS,
                    "Connection timeout in seconds, 0 uses the driver default, default: 5",
                ),
                ConfigRule::optional(
                    TAG_INDEX_KEY,
                    "",
                    "Comma separated list of tag keys to index in the tags table",
                ),
                ConfigRule::optional(
                    KEYSPACE_NAME_KEY,
                    DEFAULT_KEYSPACE,
                    "Keyspace name, default: snap",
                ),
                ConfigRule::optional(
                    CREATE_KEYSPACE_KEY,
                    true,
                    "If true, create the keyspace when it does not exist, default: true",
                ),
                ConfigRule::optional(
                    TABLE_NAME_KEY,
                    DEFAULT_TABLE,
                    "Metrics table name, default: metrics",
                ),
                ConfigRule::optional(
                    INITIAL_HOST_LOOKUP_KEY,
                    true,
                    "If false, only the configured server is used and peers are not discovered, default: true",
                ),
                ConfigRule::optional(
                    IGNORE_PEER_ADDR_KEY,
                    false,
                    "If true, connect to the configured server instead of the peer address it advertises, default: false",
                ),
                ConfigRule::optional_without_default(
                    DEBUG_KEY,
                    ConfigType::Bool,
                    "If true, log at debug level",
                ),
                ConfigRule::optional_without_default(
                    LOG_LEVEL_KEY,
                    ConfigType::String,
                    "Log level, one of: warn, error, debug, info",
                ),
            ],
        }
    }

    pub fn rules(&self) -> &[ConfigRule] {
        &self.rules
    }

    /// Check `config` against the declared rules and fill in defaults.
    ///
    /// Missing required keys and values of the wrong type are all reported
    /// together. Keys without a rule are passed through untouched.
    pub fn process(&self, config: &ConfigMap) -> Result<ConfigMap, ConfigErrors> {
        let mut errors = ConfigErrors::default();
        let mut processed = config.clone();

        for rule in &self.rules {
            match config.get(rule.key) {
                Some(value) if value.config_type() != rule.value_type => {
                    errors.add_error(format!(
                        "Invalid data type for a key {}: expected {}, found {}",
                        rule.key,
                        rule.value_type,
                        value.config_type()
                    ));
                }
                Some(_) => {}
                None => match &rule.default {
                    Some(default) => {
                        processed.insert(rule.key.to_string(), default.clone());
                    }
                    None if rule.required => {
                        errors.add_error(format!("Required key {} is missing", rule.key));
                    }
                    None => {}
                },
            }
        }

        if errors.has_errors() {
            Err(errors)
        } else {
            Ok(processed)
        }
    }
}

fn lookup<'a>(config: &'a ConfigMap, key: &str) -> PublishResult<&'a ConfigValue> {
    config.get(key).ok_or_else(|| {
        PublishError::configuration(format!("Valid configuration not found for a key {}", key))
    })
}

fn type_mismatch(key: &str, expected: ConfigType, found: &ConfigValue) -> PublishError {
    PublishError::configuration(format!(
        "Invalid data type for a key {}: expected {}, found {}",
        key,
        expected,
        found.config_type()
    ))
}

/// Typed extraction of a string key
pub fn get_str(config: &ConfigMap, key: &str) -> PublishResult<String> {
    match lookup(config, key)? {
        ConfigValue::Str(s) => Ok(s.clone()),
        other => Err(type_mismatch(key, ConfigType::String, other)),
    }
}

/// Typed extraction of an integer key
pub fn get_int(config: &ConfigMap, key: &str) -> PublishResult<i64> {
    match lookup(config, key)? {
        ConfigValue::Int(i) => Ok(*i),
        other => Err(type_mismatch(key, ConfigType::Integer, other)),
    }
}

/// Typed extraction of a boolean key
pub fn get_bool(config: &ConfigMap, key: &str) -> PublishResult<bool> {
    match lookup(config, key)? {
        ConfigValue::Bool(b) => Ok(*b),
        other => Err(type_mismatch(key, ConfigType::Bool, other)),
    }
}

fn get_seconds(config: &ConfigMap, key: &str) -> PublishResult<Option<Duration>> {
    let secs = get_int(config, key)?;
    match secs {
        0 => Ok(None),
        s if s < 0 => Err(PublishError::configuration(format!(
            "{} must not be negative, got {}",
            key, s
        ))),
        s => Ok(Some(Duration::from_secs(s as u64))),
    }
}

fn non_empty_path(value: String) -> Option<PathBuf> {
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

/// How the server certificate is trusted when SSL is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustMode {
    /// Server certificate and hostname are checked against the CA
    Verified,
    /// Traffic is encrypted but the server is not authenticated
    Unverified,
}

/// Transport security and authentication settings
#[derive(Debug, Clone, PartialEq)]
pub struct SslOptions {
    pub username: String,
    pub password: String,
    pub key_path: Option<PathBuf>,
    pub cert_path: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
    pub server_cert_verification: bool,
}

impl SslOptions {
    pub fn trust_mode(&self) -> TrustMode {
        if self.server_cert_verification {
            TrustMode::Verified
        } else {
            TrustMode::Unverified
        }
    }

    /// Username and password, only when both are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() || self.password.is_empty() {
            None
        } else {
            Some((self.username.as_str(), self.password.as_str()))
        }
    }

    /// Client certificate and key, only when both are set
    pub fn client_identity(&self) -> Option<(&PathBuf, &PathBuf)> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        }
    }

    /// Certificate material must form a complete set for the trust mode:
    /// a verified connection needs `caPath`, and a client certificate is only
    /// usable together with its key.
    pub fn validate(&self) -> PublishResult<()> {
        if self.cert_path.is_some() != self.key_path.is_some() {
            return Err(PublishError::configuration(format!(
                "While using ssl, {} and {} have to be specified together in the plugin config",
                CERT_PATH_KEY, KEY_PATH_KEY
            )));
        }

        if self.trust_mode() == TrustMode::Verified && self.ca_path.is_none() {
            return Err(PublishError::configuration(format!(
                "While using ssl with {} enabled, {} has to be specified in the plugin config",
                SERVER_CERT_VERIFICATION_KEY, CA_PATH_KEY
            )));
        }

        Ok(())
    }

    fn from_config(config: &ConfigMap) -> PublishResult<Self> {
        let options = Self {
            username: get_str(config, USERNAME_KEY)?,
            password: get_str(config, PASSWORD_KEY)?,
            key_path: non_empty_path(get_str(config, KEY_PATH_KEY)?),
            cert_path: non_empty_path(get_str(config, CERT_PATH_KEY)?),
            ca_path: non_empty_path(get_str(config, CA_PATH_KEY)?),
            server_cert_verification: get_bool(config, SERVER_CERT_VERIFICATION_KEY)?,
        };

        if options.credentials().is_none()
            && !(options.username.is_empty() && options.password.is_empty())
        {
            warn!(
                "Only one of {} and {} is set, connecting without authentication",
                USERNAME_KEY, PASSWORD_KEY
            );
        }

        options.validate()?;
        Ok(options)
    }
}

/// Immutable connection settings for one Cassandra session
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct ClientOptions {
    /// Cassandra server address
    #[validate(length(min = 1, message = "server must not be empty"))]
    pub server: String,

    /// Native protocol port; when absent the server address is used as is
    pub port: Option<u16>,

    /// Per-request timeout, driver default when absent
    pub timeout: Option<Duration>,

    /// Connect timeout, driver default when absent
    pub connection_timeout: Option<Duration>,

    /// Discover peers from the cluster topology
    pub initial_host_lookup: bool,

    /// Reach every node through the configured server address
    pub ignore_peer_addr: bool,

    /// Keyspace holding the metrics tables
    pub keyspace: String,

    /// Create the keyspace when missing
    pub create_keyspace: bool,

    /// Primary metrics table
    pub table: String,

    /// Present only when SSL is enabled
    pub ssl: Option<SslOptions>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            server: "127.0.0.1".to_string(),
            port: Some(DEFAULT_PORT as u16),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS as u64)),
            connection_timeout: Some(Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS as u64)),
            initial_host_lookup: true,
            ignore_peer_addr: false,
            keyspace: DEFAULT_KEYSPACE.to_string(),
            create_keyspace: true,
            table: DEFAULT_TABLE.to_string(),
            ssl: None,
        }
    }
}

impl ClientOptions {
    /// Address handed to the driver as the contact point
    ///
    /// IPv6 literals are bracketed before the port is appended, so `::1`
    /// becomes `[::1]:9042`.
    pub fn contact_point(&self) -> String {
        match self.port {
            Some(port) if self.server.parse::<Ipv6Addr>().is_ok() => {
                format!("[{}]:{}", self.server, port)
            }
            Some(port) => format!("{}:{}", self.server, port),
            None => self.server.clone(),
        }
    }

    pub fn schema(&self) -> MetricsSchema {
        MetricsSchema::new(self.keyspace.clone(), self.table.clone())
    }

    /// Validate the options
    pub fn check(&self) -> PublishResult<()> {
        self.validate()
            .map_err(|e| PublishError::configuration(e.to_string()))?;
        self.schema().validate()?;
        if let Some(ssl) = &self.ssl {
            ssl.validate()?;
        }
        Ok(())
    }
}

/// Everything the publisher derives from its configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherSettings {
    pub options: ClientOptions,
    pub tag_index: TagIndexSpec,
}

impl PublisherSettings {
    /// Resolve settings from a raw configuration map.
    ///
    /// Fails with a configuration error when a required key is missing, a
    /// value has the wrong type, or SSL certificate settings are incomplete.
    pub fn resolve(config: &ConfigMap) -> PublishResult<Self> {
        let config = ConfigSchema::publisher().process(config)?;

        let port = get_int(&config, PORT_KEY)?;
        let port = u16::try_from(port).map_err(|_| {
            PublishError::configuration(format!("{} out of range: {}", PORT_KEY, port))
        })?;

        let ssl = if get_bool(&config, SSL_KEY)? {
            Some(SslOptions::from_config(&config)?)
        } else {
            None
        };

        let options = ClientOptions {
            server: get_str(&config, SERVER_KEY)?,
            port: if port == 0 { None } else { Some(port) },
            timeout: get_seconds(&config, TIMEOUT_KEY)?,
            connection_timeout: get_seconds(&config, CONNECTION_TIMEOUT_KEY)?,
            initial_host_lookup: get_bool(&config, INITIAL_HOST_LOOKUP_KEY)?,
            ignore_peer_addr: get_bool(&config, IGNORE_PEER_ADDR_KEY)?,
            keyspace: get_str(&config, KEYSPACE_NAME_KEY)?,
            create_keyspace: get_bool(&config, CREATE_KEYSPACE_KEY)?,
            table: get_str(&config, TABLE_NAME_KEY)?,
            ssl,
        };
        options.check()?;

        Ok(Self {
            options,
            tag_index: TagIndexSpec::parse(&get_str(&config, TAG_INDEX_KEY)?),
        })
    }
}

/// Log level requested by the configuration, with any problems found while
/// reading it. The problems are returned rather than logged since no
/// subscriber is installed until the level is known.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLevel {
    pub level: LevelFilter,
    pub problems: Vec<String>,
}

/// Resolve the log level.
///
/// `debug: true` wins over `log-level`; without either the level is WARN.
/// Values of the wrong type or unknown levels are reported and ignored.
pub fn log_level(config: &ConfigMap) -> LogLevel {
    let mut problems = Vec::new();

    match config.get(DEBUG_KEY) {
        Some(ConfigValue::Bool(true)) => {
            return LogLevel {
                level: LevelFilter::DEBUG,
                problems,
            };
        }
        Some(ConfigValue::Bool(false)) | None => {}
        Some(other) => problems.push(format!(
            "invalid config type for {}, expected bool, found {}",
            DEBUG_KEY,
            other.config_type()
        )),
    }

    let level = match config.get(LOG_LEVEL_KEY) {
        Some(ConfigValue::Str(level)) => match level.to_lowercase().as_str() {
            "warn" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            other => {
                problems.push(format!(
                    "invalid config value {} for {}, acceptable values: warn, error, debug, info",
                    other, LOG_LEVEL_KEY
                ));
                LevelFilter::WARN
            }
        },
        Some(other) => {
            problems.push(format!(
                "invalid config type for {}, expected string, found {}",
                LOG_LEVEL_KEY,
                other.config_type()
            ));
            LevelFilter::WARN
        }
        None => LevelFilter::WARN,
    };

    LogLevel { level, problems }
}
