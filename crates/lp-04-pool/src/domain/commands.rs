//! # Pool Commands
//!
//! What a caller can ask of a pool, and what it gets back.
//!
//! On the command channel a command is a flat frame
//! `{event_name, correlation_id, timeout, nodes}`. `CLOSE`, `REFRESH` and
//! `CHECK_CACHE` are control commands; any other `event_name` is the JSON
//! body of a ledger request.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types::{NodeAlias, PoolError};

/// Caller-chosen id echoed in the response.
pub type CorrelationId = u64;

/// A command for a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolCommand {
    /// Load genesis and sync the pool ledger.
    CheckCache,
    /// Cut live requests and sync again.
    Refresh,
    /// Stop the pool.
    Close,
    /// Submit a ledger request.
    SendRequest {
        /// JSON request body
        request: String,
        /// Per-request reply deadline
        timeout: Option<Duration>,
        /// Ask exactly these nodes and return every answer
        nodes: Option<Vec<NodeAlias>>,
    },
}

impl PoolCommand {
    /// Short name for logs and `InvalidState` errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckCache => "CHECK_CACHE",
            Self::Refresh => "REFRESH",
            Self::Close => "CLOSE",
            Self::SendRequest { .. } => "SEND_REQUEST",
        }
    }
}

/// A command with its correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    /// Echoed in the response
    pub correlation_id: CorrelationId,
    /// The command
    pub command: PoolCommand,
}

/// Flat command frame as sent by an external caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFrame {
    /// `CLOSE`, `REFRESH`, `CHECK_CACHE` or a request body
    pub event_name: String,
    /// Echoed in the response
    pub correlation_id: CorrelationId,
    /// Reply deadline in milliseconds, `-1` for the pool default
    #[serde(default = "default_timeout")]
    pub timeout: i64,
    /// Comma-separated target aliases
    #[serde(default)]
    pub nodes: Option<String>,
}

fn default_timeout() -> i64 {
    -1
}

impl CommandFrame {
    /// Decode the frame into a command.
    pub fn into_envelope(self) -> CommandEnvelope {
        let command = match self.event_name.as_str() {
            "CLOSE" => PoolCommand::Close,
            "REFRESH" => PoolCommand::Refresh,
            "CHECK_CACHE" => PoolCommand::CheckCache,
            _ => PoolCommand::SendRequest {
                timeout: u64::try_from(self.timeout).ok().map(Duration::from_millis),
                nodes: self.nodes.as_deref().and_then(parse_node_list),
                request: self.event_name,
            },
        };
        CommandEnvelope {
            correlation_id: self.correlation_id,
            command,
        }
    }
}

fn parse_node_list(list: &str) -> Option<Vec<NodeAlias>> {
    let nodes: Vec<NodeAlias> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!nodes.is_empty()).then_some(nodes)
}

/// Answer to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolResponse {
    /// Id of the answered command
    pub correlation_id: CorrelationId,
    /// Reply text or failure
    pub result: Result<String, PoolError>,
}

impl PoolResponse {
    /// Successful answer.
    pub fn ok(correlation_id: CorrelationId, body: impl Into<String>) -> Self {
        Self {
            correlation_id,
            result: Ok(body.into()),
        }
    }

    /// Failed answer.
    pub fn err(correlation_id: CorrelationId, error: PoolError) -> Self {
        Self {
            correlation_id,
            result: Err(error),
        }
    }
}
