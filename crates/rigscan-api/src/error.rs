//! Error types for the rigscan-api crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The response could not be parsed even after repair.
    #[error("Decode error: {source}: {text}")]
    Decode {
        text: String,
        #[source]
        source: serde_json::Error,
    },

    /// The device reported a non-success status.
    #[error("{0}")]
    Command(String),

    /// The device-issued salt does not follow the `$<id>$<salt>$` grammar.
    #[error("Protocol configuration error: {0}")]
    ProtocolConfig(String),

    /// An encrypted payload could not be sealed or opened.
    #[error("Privileged envelope error: {0}")]
    Envelope(String),

    /// A caller-supplied argument was rejected before anything was sent.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{adapter} does not support {operation}")]
    Unsupported {
        adapter: &'static str,
        operation: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// Whether the device answered but refused the request.
    ///
    /// Batched requests that fail this way are retried one command at a time.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Command(_) | Self::Decode { .. })
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
