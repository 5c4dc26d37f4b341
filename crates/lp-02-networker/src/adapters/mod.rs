//! # Adapters
//!
//! - `secure_channel`: encrypted TCP channels to validator nodes
//! - `mock`: in-memory connector recording every message

pub mod mock;
pub mod secure_channel;

pub use mock::{MockConnector, SentMessage};
pub use secure_channel::TcpConnector;
