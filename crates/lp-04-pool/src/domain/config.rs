//! # Pool Configuration
//!
//! Timeouts and limits of one pool. Durations are written in milliseconds,
//! except `freshness_threshold` which is in seconds.
//!
//! ## Environment Overrides
//!
//! | Variable | Field |
//! |---|---|
//! | `LP_ACK_TIMEOUT_MS` | `ack_timeout` |
//! | `LP_REPLY_TIMEOUT_MS` | `reply_timeout` |
//! | `LP_CONNECTION_ACTIVE_TIMEOUT_MS` | `connection_active_timeout` |
//! | `LP_MAX_REQUESTS_PER_CONNECTION` | `max_requests_per_connection` |
//! | `LP_PREORDERED_NODES` | `preordered_nodes` (comma separated) |
//! | `LP_FRESHNESS_THRESHOLD_SECS` | `freshness_threshold` |
//! | `LP_POLL_INTERVAL_MS` | `poll_interval` |
//! | `LP_MAX_CATCHUP_RESTARTS` | `max_catchup_restarts` |
//! | `LP_PROTOCOL_VERSION` | `protocol_version` |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types::{ConfigError, NodeAlias};

/// Configuration of one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Deadline for a node to acknowledge a request
    #[serde(with = "millis")]
    pub ack_timeout: Duration,

    /// Deadline for a node to answer an acknowledged request
    #[serde(with = "millis")]
    pub reply_timeout: Duration,

    /// How long a connection pool accepts new requests
    #[serde(with = "millis")]
    pub connection_active_timeout: Duration,

    /// Requests multiplexed on one connection pool
    pub max_requests_per_connection: usize,

    /// Nodes contacted first, in order
    pub preordered_nodes: Vec<NodeAlias>,

    /// Maximum age of a state proof signature
    #[serde(with = "seconds")]
    pub freshness_threshold: Duration,

    /// Upper bound on the pool loop's sleep
    #[serde(with = "millis")]
    pub poll_interval: Duration,

    /// Catch-up rounds restarted before the pool gives up
    pub max_catchup_restarts: u32,

    /// Node protocol version
    pub protocol_version: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(20),
            reply_timeout: Duration::from_secs(60),
            connection_active_timeout: Duration::from_secs(5),
            max_requests_per_connection: 5,
            preordered_nodes: Vec::new(),
            freshness_threshold: Duration::from_secs(600),
            poll_interval: Duration::from_millis(500),
            max_catchup_restarts: 3,
            protocol_version: 2,
        }
    }
}

impl PoolConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `LP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(ms) = parse_var::<u64>(&lookup, "LP_ACK_TIMEOUT_MS", "ack_timeout")? {
            self.ack_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "LP_REPLY_TIMEOUT_MS", "reply_timeout")? {
            self.reply_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(
            &lookup,
            "LP_CONNECTION_ACTIVE_TIMEOUT_MS",
            "connection_active_timeout",
        )? {
            self.connection_active_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(&lookup, "LP_MAX_REQUESTS_PER_CONNECTION", "max_requests_per_connection")? {
            self.max_requests_per_connection = n;
        }
        if let Some(list) = lookup("LP_PREORDERED_NODES") {
            self.preordered_nodes = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "LP_FRESHNESS_THRESHOLD_SECS", "freshness_threshold")? {
            self.freshness_threshold = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "LP_POLL_INTERVAL_MS", "poll_interval")? {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(&lookup, "LP_MAX_CATCHUP_RESTARTS", "max_catchup_restarts")? {
            self.max_catchup_restarts = n;
        }
        if let Some(v) = parse_var(&lookup, "LP_PROTOCOL_VERSION", "protocol_version")? {
            self.protocol_version = v;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the pool cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("ack_timeout", self.ack_timeout),
            ("reply_timeout", self.reply_timeout),
            ("connection_active_timeout", self.connection_active_timeout),
            ("poll_interval", self.poll_interval),
        ];
        for (field, value) in positive {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if self.max_requests_per_connection == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_requests_per_connection",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            ack_timeout: Duration::from_millis(500),
            reply_timeout: Duration::from_secs(1),
            connection_active_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(20),
            ..Self::default()
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                field,
                reason: format!("{key}={raw}: {e}"),
            })
        })
        .transpose()
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.ack_timeout, Duration::from_secs(20));
        assert_eq!(config.reply_timeout, Duration::from_secs(60));
        assert_eq!(config.max_requests_per_connection, 5);
        assert_eq!(config.freshness_threshold, Duration::from_secs(600));
        assert_eq!(config.max_catchup_restarts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_keeps_defaults_for_missing_fields() {
        let config = PoolConfig::from_json(r#"{"reply_timeout": 1500, "preordered_nodes": ["Node2"]}"#).unwrap();
        assert_eq!(config.reply_timeout, Duration::from_millis(1500));
        assert_eq!(config.preordered_nodes, vec!["Node2".to_string()]);
        assert_eq!(config.ack_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_json_round_trip_units() {
        let json = serde_json::to_value(PoolConfig::default()).unwrap();
        assert_eq!(json["ack_timeout"], 20_000);
        assert_eq!(json["freshness_threshold"], 600);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LP_ACK_TIMEOUT_MS", "100"),
            ("LP_PREORDERED_NODES", "Node3, Node1,"),
            ("LP_MAX_CATCHUP_RESTARTS", "7"),
        ]
        .into_iter()
        .collect();
        let config = PoolConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.ack_timeout, Duration::from_millis(100));
        assert_eq!(config.preordered_nodes, vec!["Node3".to_string(), "Node1".to_string()]);
        assert_eq!(config.max_catchup_restarts, 7);
    }

    #[test]
    fn test_bad_env_value_rejected() {
        let result = PoolConfig::default()
            .with_overrides(|key| (key == "LP_POLL_INTERVAL_MS").then(|| "soon".to_string()));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "poll_interval", .. })
        ));
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = PoolConfig {
            max_requests_per_connection: 0,
            ..PoolConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(PoolConfig::from_json(r#"{"ack_timeout": 0}"#).is_err());
    }
}
