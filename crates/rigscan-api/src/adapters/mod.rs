//! Vendor adapters.
//!
//! Each firmware family gets one adapter type with one method per remote
//! operation and a const table of the wire commands it accepts. [`Adapter`]
//! closes over the four so callers can hold any of them by value.

mod bmminer;
mod bosminer;
mod btminer;
mod cgminer;

use async_trait::async_trait;
use rigscan_core::AdapterKind;
use serde_json::{Map, Value};

use crate::client::ApiClient;
use crate::codec::Parameter;
use crate::error::{ApiError, Result};

pub use bmminer::BmMiner;
pub use bosminer::BosMiner;
pub use btminer::{BtMiner, PoolSpec};
pub use cgminer::{CgMiner, CgMinerDialect};

/// Behaviour shared by every adapter.
#[async_trait]
pub trait MinerApi: Send + Sync {
    fn kind(&self) -> AdapterKind;

    fn client(&self) -> &ApiClient;

    /// Wire commands this adapter is allowed to batch.
    fn commands(&self) -> &'static [&'static str];

    fn supports(&self, command: &str) -> bool {
        self.commands().contains(&command)
    }

    /// Escape hatch: send any command, supported or not.
    async fn send_command(
        &self,
        command: &str,
        parameter: Option<Parameter>,
        ignore_errors: bool,
    ) -> Result<Value> {
        self.client()
            .send_command(command, parameter, ignore_errors)
            .await
    }

    /// Send a named operation and validate the reply.
    async fn call(&self, command: &str, parameter: Option<Parameter>) -> Result<Value> {
        self.send_command(command, parameter, false).await
    }

    /// Batch the supported subset of `commands`; unsupported names are dropped.
    async fn multicommand(&self, commands: &[&str]) -> Result<Value> {
        let mut allowed = Vec::with_capacity(commands.len());
        for &command in commands {
            if self.supports(command) {
                allowed.push(command);
            } else {
                tracing::warn!(
                    ip = %self.client().ip(),
                    adapter = %self.kind(),
                    command,
                    "Removing unsupported command from multicommand; use send_command to force it"
                );
            }
        }
        if allowed.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        self.client().multicommand(&allowed).await
    }
}

/// One of the four adapter implementations.
#[derive(Debug, Clone)]
pub enum Adapter {
    CgMiner(CgMiner),
    BmMiner(BmMiner),
    BosMiner(BosMiner),
    BtMiner(BtMiner),
}

impl Adapter {
    /// Build the adapter for `kind`. `btminer_password` is only used by BTMiner.
    pub fn new(kind: AdapterKind, client: ApiClient, btminer_password: &str) -> Self {
        match kind {
            AdapterKind::CgMiner => Self::CgMiner(CgMiner::new(client)),
            AdapterKind::BmMiner => Self::BmMiner(BmMiner::new(client)),
            AdapterKind::BosMiner => Self::BosMiner(BosMiner::new(client)),
            AdapterKind::BtMiner => Self::BtMiner(BtMiner::new(client, btminer_password)),
        }
    }

    pub fn api(&self) -> &dyn MinerApi {
        match self {
            Self::CgMiner(a) => a,
            Self::BmMiner(a) => a,
            Self::BosMiner(a) => a,
            Self::BtMiner(a) => a,
        }
    }

    pub fn kind(&self) -> AdapterKind {
        self.api().kind()
    }

    pub fn client(&self) -> &ApiClient {
        self.api().client()
    }

    pub fn commands(&self) -> &'static [&'static str] {
        self.api().commands()
    }

    pub async fn send_command(
        &self,
        command: &str,
        parameter: Option<Parameter>,
        ignore_errors: bool,
    ) -> Result<Value> {
        self.api()
            .send_command(command, parameter, ignore_errors)
            .await
    }

    pub async fn multicommand(&self, commands: &[&str]) -> Result<Value> {
        self.api().multicommand(commands).await
    }

    pub async fn summary(&self) -> Result<Value> {
        self.api().call("summary", None).await
    }

    pub async fn pools(&self) -> Result<Value> {
        self.api().call("pools", None).await
    }

    pub async fn devs(&self) -> Result<Value> {
        self.api().call("devs", None).await
    }

    pub async fn devdetails(&self) -> Result<Value> {
        self.api().call("devdetails", None).await
    }

    pub async fn version(&self) -> Result<Value> {
        match self {
            Self::BtMiner(a) => a.get_version().await,
            other => other.api().call("version", None).await,
        }
    }

    /// Push an opaque configuration object through the adapter's own channel.
    pub async fn send_config(&self, config: &Value) -> Result<Value> {
        match self {
            Self::BtMiner(a) => a.send_config(config).await,
            other => Err(ApiError::Unsupported {
                adapter: other.kind().as_str(),
                operation: "send_config".to_string(),
            }),
        }
    }
}
