//! rigscan-discover: Fleet discovery for ASIC miners.
//!
//! Sweeps address ranges for open management ports, classifies each
//! responding device into a firmware family and hardware model, binds the
//! matching API adapter, and caches the result.

pub mod classify;
pub mod config;
pub mod error;
pub mod fleet;
pub mod identity;
pub mod listener;
pub mod models;
pub mod registry;
pub mod scanner;
pub mod shell;
pub mod target;

pub use error::{DiscoverError, Result};
pub use identity::MinerIdentity;
pub use registry::MinerRegistry;
pub use target::NetworkTarget;
