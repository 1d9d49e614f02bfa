//! rigscan-core: Shared types for the rigscan fleet tooling.
//!
//! This crate provides the value types passed between the API client and the
//! discovery engine:
//! - Vendor firmware families and the adapter kinds that speak them
//! - Per-model hardware specifications
//! - Common error types

pub mod error;
pub mod types;

pub use error::CoreError;
pub use types::{AdapterKind, HardwareSpec, VendorFamily};
