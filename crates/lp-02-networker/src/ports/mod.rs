//! # Ports Module
//!
//! The transport the connection pools drive.

pub mod outbound;

pub use outbound::*;
