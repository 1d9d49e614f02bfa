//! CGMiner dialect, shared by stock CGMiner and Bitmain's BMMiner fork.

use async_trait::async_trait;
use rigscan_core::AdapterKind;
use serde_json::Value;

use super::MinerApi;
use crate::client::ApiClient;
use crate::codec::Parameter;
use crate::error::Result;

pub(super) const CGMINER_COMMANDS: &[&str] = &[
    "version",
    "summary",
    "pools",
    "devs",
    "edevs",
    "pga",
    "pgacount",
    "switchpool",
    "enablepool",
    "addpool",
    "poolpriority",
    "poolquota",
    "disablepool",
    "removepool",
    "save",
    "quit",
    "notify",
    "privileged",
    "pgaenable",
    "pgadisable",
    "pgaidentify",
    "devdetails",
    "restart",
    "stats",
    "estats",
    "check",
    "failover-only",
    "coin",
    "debug",
    "setconfig",
    "usbstats",
    "pgaset",
    "zero",
    "hotplug",
    "asc",
    "ascenable",
    "ascdisable",
    "ascidentify",
    "asccount",
    "ascset",
    "lcd",
    "lockstats",
];

fn old_flag(old: bool) -> Option<Parameter> {
    old.then(|| Parameter::from("old"))
}

fn set_args(n: u32, opt: &str, val: Option<i64>) -> Parameter {
    match val {
        Some(v) => format!("{n}, {opt}, {v}").into(),
        None => format!("{n}, {opt}").into(),
    }
}

/// The CGMiner RPC surface. Every method maps to one wire command.
#[async_trait]
pub trait CgMinerDialect: MinerApi {
    async fn version(&self) -> Result<Value> {
        self.call("version", None).await
    }

    async fn summary(&self) -> Result<Value> {
        self.call("summary", None).await
    }

    async fn pools(&self) -> Result<Value> {
        self.call("pools", None).await
    }

    async fn devs(&self) -> Result<Value> {
        self.call("devs", None).await
    }

    /// Devices excluding blacklisted and zombie ones. `old` includes zombies.
    async fn edevs(&self, old: bool) -> Result<Value> {
        self.call("edevs", old_flag(old)).await
    }

    async fn pga(&self, n: u32) -> Result<Value> {
        self.call("pga", Some(n.into())).await
    }

    async fn pgacount(&self) -> Result<Value> {
        self.call("pgacount", None).await
    }

    async fn switchpool(&self, n: u32) -> Result<Value> {
        self.call("switchpool", Some(n.into())).await
    }

    async fn enablepool(&self, n: u32) -> Result<Value> {
        self.call("enablepool", Some(n.into())).await
    }

    async fn addpool(&self, url: &str, username: &str, password: &str) -> Result<Value> {
        let param = format!("{url}, {username}, {password}");
        self.call("addpool", Some(param.into())).await
    }

    async fn poolpriority(&self, order: &[u32]) -> Result<Value> {
        let param = order
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.call("poolpriority", Some(param.into())).await
    }

    async fn poolquota(&self, n: u32, quota: u32) -> Result<Value> {
        self.call("poolquota", Some(format!("{n}, {quota}").into()))
            .await
    }

    async fn disablepool(&self, n: u32) -> Result<Value> {
        self.call("disablepool", Some(n.into())).await
    }

    async fn removepool(&self, n: u32) -> Result<Value> {
        self.call("removepool", Some(n.into())).await
    }

    async fn save(&self, filename: Option<&str>) -> Result<Value> {
        self.call("save", filename.map(Parameter::from)).await
    }

    async fn quit(&self) -> Result<Value> {
        self.call("quit", None).await
    }

    async fn notify(&self) -> Result<Value> {
        self.call("notify", None).await
    }

    async fn privileged(&self) -> Result<Value> {
        self.call("privileged", None).await
    }

    async fn pgaenable(&self, n: u32) -> Result<Value> {
        self.call("pgaenable", Some(n.into())).await
    }

    async fn pgadisable(&self, n: u32) -> Result<Value> {
        self.call("pgadisable", Some(n.into())).await
    }

    async fn pgaidentify(&self, n: u32) -> Result<Value> {
        self.call("pgaidentify", Some(n.into())).await
    }

    async fn devdetails(&self) -> Result<Value> {
        self.call("devdetails", None).await
    }

    async fn restart(&self) -> Result<Value> {
        self.call("restart", None).await
    }

    async fn stats(&self) -> Result<Value> {
        self.call("stats", None).await
    }

    async fn estats(&self, old: bool) -> Result<Value> {
        self.call("estats", old_flag(old)).await
    }

    /// Ask whether `command` exists and is accessible.
    async fn check(&self, command: &str) -> Result<Value> {
        self.call("check", Some(command.into())).await
    }

    async fn failover_only(&self, failover: bool) -> Result<Value> {
        self.call("failover-only", Some(failover.into())).await
    }

    async fn coin(&self) -> Result<Value> {
        self.call("coin", None).await
    }

    async fn debug(&self, setting: &str) -> Result<Value> {
        self.call("debug", Some(setting.into())).await
    }

    async fn setconfig(&self, name: &str, n: i64) -> Result<Value> {
        self.call("setconfig", Some(format!("{name}, {n}").into()))
            .await
    }

    async fn usbstats(&self) -> Result<Value> {
        self.call("usbstats", None).await
    }

    async fn pgaset(&self, n: u32, opt: &str, val: Option<i64>) -> Result<Value> {
        self.call("pgaset", Some(set_args(n, opt, val))).await
    }

    /// Zero the `which` statistics, optionally printing a summary first.
    async fn zero(&self, which: &str, summary: bool) -> Result<Value> {
        self.call("zero", Some(format!("{which}, {summary}").into()))
            .await
    }

    async fn hotplug(&self, n: u32) -> Result<Value> {
        self.call("hotplug", Some(n.into())).await
    }

    async fn asc(&self, n: u32) -> Result<Value> {
        self.call("asc", Some(n.into())).await
    }

    async fn ascenable(&self, n: u32) -> Result<Value> {
        self.call("ascenable", Some(n.into())).await
    }

    async fn ascdisable(&self, n: u32) -> Result<Value> {
        self.call("ascdisable", Some(n.into())).await
    }

    async fn ascidentify(&self, n: u32) -> Result<Value> {
        self.call("ascidentify", Some(n.into())).await
    }

    async fn asccount(&self) -> Result<Value> {
        self.call("asccount", None).await
    }

    async fn ascset(&self, n: u32, opt: &str, val: Option<i64>) -> Result<Value> {
        self.call("ascset", Some(set_args(n, opt, val))).await
    }

    async fn lcd(&self) -> Result<Value> {
        self.call("lcd", None).await
    }

    async fn lockstats(&self) -> Result<Value> {
        self.call("lockstats", None).await
    }
}

/// Stock CGMiner, as run by Avalon and older Antminer firmware.
#[derive(Debug, Clone)]
pub struct CgMiner {
    client: ApiClient,
}

impl CgMiner {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MinerApi for CgMiner {
    fn kind(&self) -> AdapterKind {
        AdapterKind::CgMiner
    }

    fn client(&self) -> &ApiClient {
        &self.client
    }

    fn commands(&self) -> &'static [&'static str] {
        CGMINER_COMMANDS
    }
}

impl CgMinerDialect for CgMiner {}
