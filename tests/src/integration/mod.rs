//! Cross-subsystem flows: lp-04 pool over lp-03 machines, lp-02 routing and
//! lp-01 proof checks.

pub mod fixtures;

mod lifecycle;
mod requests;
