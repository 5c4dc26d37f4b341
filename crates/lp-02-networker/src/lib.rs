//! # LP-02 Networker
//!
//! Encrypted channels to validator nodes, shared between requests.
//!
//! **Subsystem ID:** 02
//! **Architecture:** Hexagonal (domain / application / ports / adapters)
//!
//! ## Role in System
//!
//! Request state machines emit `NetworkCommand`s; the pool loop hands them
//! to the `NetworkRouter`, which binds each request to a `ConnectionPool`.
//! Pools open one channel per node on first use, track a deadline per
//! `(request, node)` and report what the nodes send back.
//!
//! ```text
//! [Request machine] ──NetworkCommand──→ [NetworkRouter] ──→ [ConnectionPool]
//!                                                                │ NodeConnector
//!                                                                ↓
//! [Pool loop] ←──InboundFrame── reader task ←── encrypted TCP ── [Node]
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod application;
pub mod domain;
pub mod ports;

pub use adapters::{MockConnector, SentMessage, TcpConnector};
pub use application::NetworkRouter;
pub use domain::{
    shuffle_nodes, ClientSecret, ConnectionPool, ConnectionSettings, NetworkerError, NodeMessage,
    TimeoutKey,
};
pub use ports::{InboundFrame, NodeChannel, NodeConnector, NodeLink};
