//! Errors raised while opening a pool or managing named pools.

use std::path::PathBuf;

use shared_types::{ConfigError, PoolError};
use thiserror::Error;

/// Opening a pool failed before its task started.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The genesis file could not be read
    #[error("cannot read genesis file {path}: {source}")]
    GenesisFile {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The pool configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Named pool configurations and the pools opened from them.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Empty name, or one that is not a single path component
    #[error("invalid pool name {0:?}")]
    InvalidName(String),

    /// A configuration with this name is already stored
    #[error("pool {0} already exists")]
    AlreadyExists(String),

    /// No configuration with this name is stored
    #[error("pool {0} does not exist")]
    NotFound(String),

    /// The genesis file holds no transaction
    #[error("genesis file {0} holds no transactions")]
    EmptyGenesis(PathBuf),

    /// A pool with this name is open or opening
    #[error("pool {0} is already open")]
    AlreadyOpen(String),

    /// No pool with this name is open
    #[error("pool {0} is not open")]
    NotOpen(String),

    /// Reading or writing a stored configuration failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// A stored `config.json` could not be decoded
    #[error("corrupt pool record {path}: {reason}")]
    Record {
        /// Path of the record
        path: PathBuf,
        /// Decoder message
        reason: String,
    },

    /// Genesis or configuration values are invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The pool task could not be started
    #[error(transparent)]
    Open(#[from] OpenError),

    /// The pool answered a command with a failure
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl RegistryError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
