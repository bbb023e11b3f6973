//! Connector configuration.
//!
//! [`ConnectorConfig`] carries the raw string properties a job declares for
//! a source (e.g. from a job file's `source { ... }` block).
//! [`EnumeratorConfig`] is the typed view the split enumerator runs with,
//! parsed via [`EnumeratorConfig::from_config`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Raw connector properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectorConfig {
    connector_type: String,
    properties: HashMap<String, String>,
}

impl ConnectorConfig {
    /// Creates an empty config for the given connector type.
    #[must_use]
    pub fn new(connector_type: impl Into<String>) -> Self {
        Self {
            connector_type: connector_type.into(),
            properties: HashMap::new(),
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets a property, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// The connector type (e.g. `weaviate`, `jdbc`).
    #[must_use]
    pub fn connector_type(&self) -> &str {
        &self.connector_type
    }

    /// Returns a property value, if set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Returns a property value or a [`ConfigError::Missing`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the key is absent.
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    /// Parses a property with [`FromStr`], returning `None` when unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the value does not parse.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get(key)
            .map(|v| {
                v.trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid(format!("invalid {key}: '{v}'")))
            })
            .transpose()
    }

    /// All properties.
    #[must_use]
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Properties starting with `prefix`, with the prefix stripped.
    #[must_use]
    pub fn properties_with_prefix(&self, prefix: &str) -> HashMap<String, String> {
        self.properties
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(prefix)
                    .map(|rest| (rest.to_string(), v.clone()))
            })
            .collect()
    }
}

/// How splits produced by one table expansion are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignmentStrategy {
    /// All splits go to the reader whose request triggered the expansion.
    #[default]
    Requester,
    /// Splits are spread round-robin over every reader awaiting work.
    Balanced,
}

impl AssignmentStrategy {
    fn as_str(self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Balanced => "balanced",
        }
    }
}

impl fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStrategy {
    type Err = ConfigError;

    /// Case-insensitive; `round-robin` / `round_robin` alias `balanced`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "requester" => Ok(Self::Requester),
            "balanced" | "round_robin" => Ok(Self::Balanced),
            other => Err(ConfigError::Invalid(format!(
                "unknown split assignment strategy: '{other}'"
            ))),
        }
    }
}

/// Typed split enumerator configuration.
#[derive(Debug, Clone)]
pub struct EnumeratorConfig {
    /// Interval at which `run()` polls the catalog for new tables.
    /// `None` disables incremental discovery.
    pub discovery_interval: Option<Duration>,
    /// Retries per table after the first failed expansion attempt.
    pub max_discovery_retries: u32,
    /// Initial backoff between expansion attempts.
    pub initial_retry_delay: Duration,
    /// Backoff ceiling between expansion attempts.
    pub max_retry_delay: Duration,
    /// Maximum number of tables expanded concurrently.
    pub max_concurrent_expansions: usize,
    /// Assignment strategy for freshly expanded splits.
    pub assignment: AssignmentStrategy,
    /// Capacity of the coordinator command channel.
    pub channel_capacity: usize,
    /// How long `close()` waits for the coordinator task to exit.
    pub close_timeout: Duration,
}

impl Default for EnumeratorConfig {
    fn default() -> Self {
        Self {
            discovery_interval: None,
            max_discovery_retries: 3,
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(10),
            max_concurrent_expansions: 1,
            assignment: AssignmentStrategy::Requester,
            channel_capacity: 128,
            close_timeout: Duration::from_secs(30),
        }
    }
}

impl EnumeratorConfig {
    /// Parses enumerator settings from connector properties.
    ///
    /// # Recognized keys
    ///
    /// - `discovery.interval.ms` (0 disables incremental discovery)
    /// - `discovery.max.retries`
    /// - `discovery.retry.initial.ms`, `discovery.retry.max.ms`
    /// - `discovery.max.concurrent`
    /// - `split.assignment` (`requester` | `balanced`)
    /// - `enumerator.channel.capacity`
    /// - `enumerator.close.timeout.ms`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` on unparsable values or invalid combinations.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(ms) = config.get_parsed::<u64>("discovery.interval.ms")? {
            cfg.discovery_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(n) = config.get_parsed("discovery.max.retries")? {
            cfg.max_discovery_retries = n;
        }
        if let Some(ms) = config.get_parsed("discovery.retry.initial.ms")? {
            cfg.initial_retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = config.get_parsed("discovery.retry.max.ms")? {
            cfg.max_retry_delay = Duration::from_millis(ms);
        }
        if let Some(n) = config.get_parsed("discovery.max.concurrent")? {
            cfg.max_concurrent_expansions = n;
        }
        if let Some(v) = config.get("split.assignment") {
            cfg.assignment = v.parse()?;
        }
        if let Some(n) = config.get_parsed("enumerator.channel.capacity")? {
            cfg.channel_capacity = n;
        }
        if let Some(ms) = config.get_parsed("enumerator.close.timeout.ms")? {
            cfg.close_timeout = Duration::from_millis(ms);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the configuration for consistency.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` on invalid combinations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_expansions == 0 {
            return Err(ConfigError::Invalid(
                "discovery.max.concurrent must be at least 1".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "enumerator.channel.capacity must be at least 1".into(),
            ));
        }
        if self.initial_retry_delay > self.max_retry_delay {
            return Err(ConfigError::Invalid(format!(
                "discovery.retry.initial.ms ({:?}) exceeds discovery.retry.max.ms ({:?})",
                self.initial_retry_delay, self.max_retry_delay
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_and_prefix() {
        let config = ConnectorConfig::new("weaviate")
            .with_property("url", "http://localhost:8080")
            .with_property("auth.user", "alice")
            .with_property("auth.token", "secret");

        assert_eq!(config.connector_type(), "weaviate");
        assert_eq!(config.require("url").unwrap(), "http://localhost:8080");
        assert_eq!(
            config.require("missing").unwrap_err(),
            ConfigError::Missing("missing".into())
        );

        let auth = config.properties_with_prefix("auth.");
        assert_eq!(auth.len(), 2);
        assert_eq!(auth["user"], "alice");
    }

    #[test]
    fn test_enumerator_config_defaults() {
        let cfg = EnumeratorConfig::from_config(&ConnectorConfig::new("test")).unwrap();
        assert!(cfg.discovery_interval.is_none());
        assert_eq!(cfg.max_discovery_retries, 3);
        assert_eq!(cfg.max_concurrent_expansions, 1);
        assert_eq!(cfg.assignment, AssignmentStrategy::Requester);
    }

    #[test]
    fn test_enumerator_config_parse() {
        let config = ConnectorConfig::new("test")
            .with_property("discovery.interval.ms", "500")
            .with_property("discovery.max.retries", "5")
            .with_property("discovery.max.concurrent", "4")
            .with_property("split.assignment", "Round-Robin");
        let cfg = EnumeratorConfig::from_config(&config).unwrap();
        assert_eq!(cfg.discovery_interval, Some(Duration::from_millis(500)));
        assert_eq!(cfg.max_discovery_retries, 5);
        assert_eq!(cfg.max_concurrent_expansions, 4);
        assert_eq!(cfg.assignment, AssignmentStrategy::Balanced);
    }

    #[test]
    fn test_enumerator_config_zero_interval_disables_discovery() {
        let config = ConnectorConfig::new("test").with_property("discovery.interval.ms", "0");
        let cfg = EnumeratorConfig::from_config(&config).unwrap();
        assert!(cfg.discovery_interval.is_none());
    }

    #[test]
    fn test_enumerator_config_rejects_invalid() {
        let bad_number =
            ConnectorConfig::new("test").with_property("discovery.max.retries", "many");
        assert!(matches!(
            EnumeratorConfig::from_config(&bad_number),
            Err(ConfigError::Invalid(_))
        ));

        let bad_strategy = ConnectorConfig::new("test").with_property("split.assignment", "random");
        let err = EnumeratorConfig::from_config(&bad_strategy).unwrap_err();
        assert!(err.to_string().contains("unknown split assignment strategy"));

        let zero_concurrency =
            ConnectorConfig::new("test").with_property("discovery.max.concurrent", "0");
        assert!(EnumeratorConfig::from_config(&zero_concurrency).is_err());
    }

    #[test]
    fn test_assignment_strategy_display() {
        assert_eq!(AssignmentStrategy::Balanced.to_string(), "balanced");
        assert_eq!(
            "requester".parse::<AssignmentStrategy>().unwrap(),
            AssignmentStrategy::Requester
        );
        assert_eq!(
            "Round-Robin".parse::<AssignmentStrategy>().unwrap(),
            AssignmentStrategy::Balanced
        );
        let err = "sticky".parse::<AssignmentStrategy>().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
