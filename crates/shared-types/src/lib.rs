//! # Shared Types Crate
//!
//! Types that cross subsystem boundaries in the ledger pool client.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: node identities, request ids and the
//!   commands a request machine hands to the networker live here.
//! - **Injected time and ids**: the `Clock` port and the `SequenceGenerator`
//!   replace ambient statics so every state machine is testable in isolation.

pub mod clock;
pub mod commands;
pub mod entities;
pub mod errors;
pub mod sequence;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::NetworkCommand;
pub use entities::*;
pub use errors::*;
pub use sequence::SequenceGenerator;
