//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for log output.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to log events
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error or a directive list)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether to print thread ids
    pub thread_ids: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ledger-pool".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            thread_ids: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LP_SERVICE_NAME`: Service name (default: ledger-pool)
    /// - `LP_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `LP_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `LP_THREAD_IDS`: Print thread ids (default: false)
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("LP_SERVICE_NAME")
                .unwrap_or_else(|_| "ledger-pool".to_string()),

            log_level: env::var("LP_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("LP_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),

            thread_ids: env::var("LP_THREAD_IDS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}
