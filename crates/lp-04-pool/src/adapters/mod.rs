//! Pool adapters: on-disk pool configurations.

pub mod pool_store;

pub use pool_store::{PoolRecord, PoolStore, StoredPool};
