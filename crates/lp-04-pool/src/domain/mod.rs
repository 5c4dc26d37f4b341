//! Pool domain: configuration, genesis, commands.

pub mod commands;
pub mod config;
pub mod errors;
pub mod genesis;

pub use commands::{CommandEnvelope, CommandFrame, CorrelationId, PoolCommand, PoolResponse};
pub use config::PoolConfig;
pub use errors::{OpenError, RegistryError};
pub use genesis::{
    boxed_pubkey, build_node_state, ledger_from_genesis, parse_genesis, PoolNodes, NODE_TXN_TYPE,
    VALIDATOR_SERVICE,
};
