//! BOSMiner: the Braiins OS management API.
//!
//! Pool management commands are not exposed by this firmware; pools are set
//! through its configuration file instead.

use async_trait::async_trait;
use rigscan_core::AdapterKind;
use serde_json::Value;

use super::MinerApi;
use crate::client::ApiClient;
use crate::codec::Parameter;
use crate::error::Result;

const BOSMINER_COMMANDS: &[&str] = &[
    "asccount",
    "asc",
    "devdetails",
    "devs",
    "edevs",
    "pools",
    "summary",
    "stats",
    "version",
    "estats",
    "check",
    "coin",
    "lcd",
    "fans",
    "tempctrl",
    "temps",
    "tunerstatus",
    "pause",
    "resume",
];

#[derive(Debug, Clone)]
pub struct BosMiner {
    client: ApiClient,
}

impl BosMiner {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn asccount(&self) -> Result<Value> {
        self.call("asccount", None).await
    }

    pub async fn asc(&self, n: u32) -> Result<Value> {
        self.call("asc", Some(n.into())).await
    }

    pub async fn devdetails(&self) -> Result<Value> {
        self.call("devdetails", None).await
    }

    pub async fn devs(&self) -> Result<Value> {
        self.call("devs", None).await
    }

    pub async fn edevs(&self, old: bool) -> Result<Value> {
        self.call("edevs", old.then(|| Parameter::from("old")))
            .await
    }

    pub async fn pools(&self) -> Result<Value> {
        self.call("pools", None).await
    }

    pub async fn summary(&self) -> Result<Value> {
        self.call("summary", None).await
    }

    pub async fn stats(&self) -> Result<Value> {
        self.call("stats", None).await
    }

    pub async fn version(&self) -> Result<Value> {
        self.call("version", None).await
    }

    pub async fn estats(&self) -> Result<Value> {
        self.call("estats", None).await
    }

    pub async fn check(&self, command: &str) -> Result<Value> {
        self.call("check", Some(command.into())).await
    }

    pub async fn coin(&self) -> Result<Value> {
        self.call("coin", None).await
    }

    pub async fn lcd(&self) -> Result<Value> {
        self.call("lcd", None).await
    }

    pub async fn fans(&self) -> Result<Value> {
        self.call("fans", None).await
    }

    pub async fn tempctrl(&self) -> Result<Value> {
        self.call("tempctrl", None).await
    }

    pub async fn temps(&self) -> Result<Value> {
        self.call("temps", None).await
    }

    /// Autotuner state per chain.
    pub async fn tunerstatus(&self) -> Result<Value> {
        self.call("tunerstatus", None).await
    }

    pub async fn pause(&self) -> Result<Value> {
        self.call("pause", None).await
    }

    pub async fn resume(&self) -> Result<Value> {
        self.call("resume", None).await
    }
}

#[async_trait]
impl MinerApi for BosMiner {
    fn kind(&self) -> AdapterKind {
        AdapterKind::BosMiner
    }

    fn client(&self) -> &ApiClient {
        &self.client
    }

    fn commands(&self) -> &'static [&'static str] {
        BOSMINER_COMMANDS
    }
}
