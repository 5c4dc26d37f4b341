//! # Error Types
//!
//! Error taxonomy surfaced to callers of a pool.

use thiserror::Error;

/// Bad or missing genesis data or pool configuration. Fatal at open time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Genesis file or line could not be parsed.
    #[error("Invalid genesis transaction: {0}")]
    InvalidGenesis(String),

    /// Genesis yielded no usable validator.
    #[error("Genesis defines no validator nodes")]
    NoValidators,

    /// A key in genesis could not be decoded or converted.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Configuration source could not be read.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Failure answered to the caller of a pool command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Bad pool configuration or genesis.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Request body or node message could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A state proof was incomplete, inconsistent or badly signed.
    #[error("Proof error: {0}")]
    Proof(String),

    /// No node answered before its deadline.
    #[error("Request timed out: no node answered")]
    Timeout,

    /// The request finished without a decided answer.
    #[error("Quorum unreachable: {0}")]
    QuorumUnreachable(String),

    /// The request was cut short by a refresh or close.
    #[error("Request terminated: {0}")]
    Terminated(String),

    /// The pool cannot accept this command in its current state.
    #[error("Command {command} not applicable in state {state}")]
    InvalidState {
        /// Command name
        command: String,
        /// Pool state name
        state: &'static str,
    },

    /// Socket or channel crypto failure.
    #[error("Transport error: {0}")]
    Transport(String),
}
