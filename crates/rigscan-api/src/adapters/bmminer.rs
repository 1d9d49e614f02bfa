//! BMMiner: Bitmain's CGMiner fork shipped on stock Antminer firmware.

use std::sync::OnceLock;

use async_trait::async_trait;
use rigscan_core::AdapterKind;
use serde_json::Value;

use super::cgminer::{CgMinerDialect, CGMINER_COMMANDS};
use super::MinerApi;
use crate::client::ApiClient;
use crate::error::Result;

fn bmminer_commands() -> &'static [&'static str] {
    static COMMANDS: OnceLock<Vec<&'static str>> = OnceLock::new();
    COMMANDS.get_or_init(|| {
        let mut commands = CGMINER_COMMANDS.to_vec();
        commands.push("config");
        commands
    })
}

#[derive(Debug, Clone)]
pub struct BmMiner {
    client: ApiClient,
}

impl BmMiner {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Runtime configuration: ASC count, PGA count, pool count, strategy.
    pub async fn config(&self) -> Result<Value> {
        self.call("config", None).await
    }
}

#[async_trait]
impl MinerApi for BmMiner {
    fn kind(&self) -> AdapterKind {
        AdapterKind::BmMiner
    }

    fn client(&self) -> &ApiClient {
        &self.client
    }

    fn commands(&self) -> &'static [&'static str] {
        bmminer_commands()
    }
}

impl CgMinerDialect for BmMiner {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{command_of, ok_response, spawn_device};

    #[test]
    fn test_bmminer_extends_cgminer_table() {
        let commands = bmminer_commands();
        assert!(commands.contains(&"config"));
        assert!(CGMINER_COMMANDS.iter().all(|c| commands.contains(c)));
    }

    #[tokio::test]
    async fn test_config_and_inherited_operations() {
        let (client, seen) = spawn_device(|req| ok_response(&command_of(req))).await;
        let miner = BmMiner::new(client);
        miner.config().await.unwrap();
        miner.stats().await.unwrap();

        let commands: Vec<String> = seen.lock().unwrap().iter().map(|r| command_of(r)).collect();
        assert_eq!(commands, vec!["config", "stats"]);
    }
}
