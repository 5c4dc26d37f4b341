//! # Ports Module
//!
//! The inbound API other subsystems verify replies through.

pub mod inbound;

pub use inbound::*;
