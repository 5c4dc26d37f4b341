//! # Pool Telemetry
//!
//! Structured logging for the ledger pool client.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pool_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_logging(&config).expect("Failed to init logging");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LP_SERVICE_NAME` | `ledger-pool` | Service name attached to every event |
//! | `LP_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `LP_JSON_LOGS` | `false` | Emit JSON lines instead of pretty output |

#![warn(missing_docs)]

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::init_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The filter directive could not be parsed.
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber was already installed.
    #[error("Failed to install subscriber: {0}")]
    Install(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_name() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "ledger-pool");
    }
}
