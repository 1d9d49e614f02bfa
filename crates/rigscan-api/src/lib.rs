//! rigscan-api: management API client for ASIC miner firmware.
//!
//! Every vendor dialect is a JSON-over-TCP protocol on port 4028. This crate
//! owns the wire codec, the one-shot transport, response validation, the
//! per-vendor command surfaces, and the encrypted privileged session used by
//! BTMiner firmware.

pub mod adapters;
pub mod client;
pub mod codec;
pub mod error;
pub mod privileged;
pub mod transport;
pub mod validate;

pub use adapters::{Adapter, MinerApi};
pub use client::ApiClient;
pub use codec::{CommandEnvelope, Parameter};
pub use error::{ApiError, Result};
pub use validate::Validation;

/// Default management API port.
pub const DEFAULT_PORT: u16 = 4028;
