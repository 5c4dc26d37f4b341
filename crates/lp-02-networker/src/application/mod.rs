//! # Application Module

pub mod router;

pub use router::NetworkRouter;
