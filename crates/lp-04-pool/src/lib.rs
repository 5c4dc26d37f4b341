//! # LP-04 Pool
//!
//! A client's connection to one validator pool, from genesis to answers.
//!
//! **Subsystem ID:** 04
//! **Architecture:** Hexagonal (domain / application / adapters)
//!
//! ## Lifecycle
//!
//! ```text
//! Initialization ──CHECK_CACHE──→ GettingCatchupTarget ──agreed, behind──→ SyncCatchup
//!                                       │ agreed, in sync                      │ fetched
//!                                       ↓                                      ↓
//!                                    Active ←───────────────────────────────────┘
//!                                       │ outdated ledger seen
//!                                       ↓
//!                                  Terminated ──REFRESH──→ GettingCatchupTarget
//!
//! any state ──CLOSE──→ Closed
//! ```
//!
//! While `Active` the pool runs any number of ledger requests at once, one
//! `RequestStateMachine` (lp-03) each, over the connection pools of the
//! `NetworkRouter` (lp-02).
//!
//! ## Usage
//!
//! ```ignore
//! let (pool, task) = PoolHandle::open_genesis_file(path, PoolConfig::from_env()?, connector)?;
//! pool.check_cache().await?;
//! let reply = pool.send_request(request_json).await?;
//! pool.close().await?;
//! ```
//!
//! Named pools live in a [`PoolRegistry`] over a [`PoolStore`] directory:
//!
//! ```ignore
//! let registry = PoolRegistry::new(PoolStore::new(dir), connector);
//! registry.create("sandbox", genesis_path, None)?;
//! let pool = registry.open("sandbox", None).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod application;
pub mod domain;

#[cfg(any(test, feature = "test-utils"))]
#[allow(missing_docs)]
pub mod testing;

pub use adapters::{PoolRecord, PoolStore, StoredPool};
pub use application::{
    ActiveState, CatchupState, PoolChannels, PoolEffect, PoolEvent, PoolHandle, PoolRegistry, PoolRuntime,
    PoolState, PoolStateMachine,
};
pub use domain::{
    build_node_state, ledger_from_genesis, parse_genesis, CommandEnvelope, CommandFrame, CorrelationId,
    OpenError, PoolCommand, PoolConfig, PoolNodes, PoolResponse, RegistryError,
};
