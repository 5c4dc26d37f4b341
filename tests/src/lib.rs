//! # Ledger Pool Test Suite
//!
//! Flows that cross subsystem boundaries, driven through `PoolHandle` with
//! an in-memory connector standing in for the validators.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/
//! │   ├── fixtures.rs     # Simulated validator pool
//! │   ├── lifecycle.rs    # Open, catch-up, refresh, close
//! │   └── requests.rs     # Consensus, proof-verified and addressed requests
//! └── benches/
//!     └── pool_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p lp-tests
//! cargo test -p lp-tests integration::requests::
//! cargo bench -p lp-tests
//! ```

#![allow(dead_code)]

pub mod integration;
