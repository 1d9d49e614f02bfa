//! Error types for the rigscan-discover crate.

use std::net::Ipv4Addr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Invalid target {input:?}: {reason}")]
    Target { input: String, reason: String },

    #[error("API error: {0}")]
    Api(#[from] rigscan_api::ApiError),

    #[error("Device {0} was not classified")]
    Unclassified(Ipv4Addr),

    #[error("Shell error: {0}")]
    Shell(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoverError {
    pub(crate) fn target(input: &str, reason: impl Into<String>) -> Self {
        Self::Target {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
