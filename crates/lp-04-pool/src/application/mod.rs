//! Pool application layer.

pub mod handle;
pub mod registry;
pub mod runtime;
pub mod state_machine;

pub use handle::PoolHandle;
pub use registry::PoolRegistry;
pub use runtime::{PoolChannels, PoolRuntime, COMMAND_CAPACITY, INBOUND_CAPACITY};
pub use state_machine::{ActiveState, CatchupState, PoolEffect, PoolEvent, PoolState, PoolStateMachine};
