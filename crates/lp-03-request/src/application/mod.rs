//! # Application Layer
//!
//! The request state machine and its pool-wide context.

pub mod machine;

pub use machine::{
    RequestContext, RequestState, RequestStateMachine, RequestTransition, DEFAULT_ACK_TIMEOUT,
    DEFAULT_PROTOCOL_VERSION, DEFAULT_REPLY_TIMEOUT,
};
