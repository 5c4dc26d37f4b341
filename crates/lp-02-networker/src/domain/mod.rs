//! # Domain Layer
//!
//! Connection pools, channel keys and errors.

pub mod connection_pool;
pub mod errors;
pub mod session;

pub use connection_pool::{shuffle_nodes, ConnectionPool, ConnectionSettings, NodeMessage, TimeoutKey};
pub use errors::NetworkerError;
pub use session::{check_frame_len, encode_frame, ClientSecret, FrameCipher, SessionKeys, MAX_FRAME_LEN, NONCE_LEN};
