//! BTMiner: MicroBT Whatsminer firmware.
//!
//! Read-only commands use the plain JSON dialect. Everything that changes
//! device state goes through [`BtMiner::send_privileged_command`], which
//! fetches a fresh token per call and encrypts the request with it.

use async_trait::async_trait;
use rigscan_core::AdapterKind;
use serde_json::{json, Map, Value};

use super::MinerApi;
use crate::client::ApiClient;
use crate::error::{ApiError, Result};
use crate::privileged::PrivilegedToken;

const BTMINER_COMMANDS: &[&str] = &[
    "summary",
    "pools",
    "devs",
    "edevs",
    "devdetails",
    "get_psu",
    "get_version",
    "status",
    "get_miner_info",
    "get_token",
];

const MAX_POOLS: usize = 3;
const MAX_PASSWORD_BYTES: usize = 8;
const PRE_POWER_ON_MESSAGES: [&str; 3] =
    ["wait for adjust temp", "adjust complete", "adjust continue"];

/// One pool slot for [`BtMiner::update_pools`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSpec {
    pub url: String,
    pub worker: String,
    pub password: String,
}

impl PoolSpec {
    pub fn new(url: impl Into<String>, worker: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            worker: worker.into(),
            password: password.into(),
        }
    }
}

#[derive(Clone)]
pub struct BtMiner {
    client: ApiClient,
    password: String,
}

impl std::fmt::Debug for BtMiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtMiner")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

impl BtMiner {
    pub fn new(client: ApiClient, password: impl Into<String>) -> Self {
        Self {
            client,
            password: password.into(),
        }
    }

    /// Request a salt/nonce pair and derive a one-shot token from it.
    pub async fn get_token(&self) -> Result<PrivilegedToken> {
        let reply = self.client.send_command("get_token", None, false).await?;
        PrivilegedToken::from_reply(&self.password, &reply)
    }

    /// Encrypt `command` under a fresh token, send it, and decrypt the reply.
    ///
    /// A reply that cannot be decrypted is logged and treated as empty.
    pub async fn send_privileged_command(&self, command: Value) -> Result<Value> {
        let token = self.get_token().await?;
        let payload = token.seal(&command)?;
        let reply = self.client.exchange(&payload).await?;

        let data = match reply.get("enc").and_then(Value::as_str) {
            Some(ciphertext) => match token.open(ciphertext) {
                Ok(plain) => plain,
                Err(e) => {
                    tracing::warn!(ip = %self.client.ip(), error = %e, "Failed to decrypt privileged reply");
                    Value::Object(Map::new())
                }
            },
            None => reply,
        };

        self.client.check(data, true)
    }

    // ── Privileged operations ─────────────────────────────────────

    /// Replace the pool list. At least one and at most three pools.
    pub async fn update_pools(&self, pools: &[PoolSpec]) -> Result<Value> {
        if pools.is_empty() {
            return Err(ApiError::InvalidParameter("No pools set.".to_string()));
        }
        if pools.len() > MAX_POOLS {
            return Err(ApiError::InvalidParameter(format!(
                "At most {MAX_POOLS} pools may be set, got {}",
                pools.len()
            )));
        }

        let mut command = Map::new();
        command.insert("cmd".to_string(), json!("update_pools"));
        for (i, pool) in pools.iter().enumerate() {
            let slot = i + 1;
            command.insert(format!("pool{slot}"), json!(pool.url));
            command.insert(format!("worker{slot}"), json!(pool.worker));
            command.insert(format!("passwd{slot}"), json!(pool.password));
        }
        self.send_privileged_command(Value::Object(command)).await
    }

    /// Restart the mining process, not the device.
    pub async fn restart(&self) -> Result<Value> {
        self.send_privileged_command(json!({"cmd": "restart_btminer"}))
            .await
    }

    /// Stop hashing. With `respond_before` the device replies first.
    pub async fn power_off(&self, respond_before: bool) -> Result<Value> {
        self.send_privileged_command(json!({"cmd": "power_off", "respbefore": flag(respond_before)}))
            .await
    }

    pub async fn power_on(&self) -> Result<Value> {
        self.send_privileged_command(json!({"cmd": "power_on"})).await
    }

    pub async fn reset_led(&self) -> Result<Value> {
        self.send_privileged_command(json!({"cmd": "set_led", "param": "auto"}))
            .await
    }

    /// Flash the LED. Times are in milliseconds within one `period` cycle.
    pub async fn set_led(&self, color: &str, period: u32, duration: u32, start: u32) -> Result<Value> {
        self.send_privileged_command(json!({
            "cmd": "set_led",
            "color": color,
            "period": period,
            "duration": duration,
            "start": start,
        }))
        .await
    }

    pub async fn set_low_power(&self) -> Result<Value> {
        self.send_privileged_command(json!({"cmd": "set_low_power"}))
            .await
    }

    pub async fn reboot(&self) -> Result<Value> {
        self.send_privileged_command(json!({"cmd": "reboot"})).await
    }

    pub async fn factory_reset(&self) -> Result<Value> {
        self.send_privileged_command(json!({"cmd": "factory_reset"}))
            .await
    }

    pub async fn update_pwd(&self, old_pwd: &str, new_pwd: &str) -> Result<Value> {
        if new_pwd.len() > MAX_PASSWORD_BYTES {
            return Err(ApiError::InvalidParameter(format!(
                "New password too long, the max length is {MAX_PASSWORD_BYTES}. Password size: {}",
                new_pwd.len()
            )));
        }
        self.send_privileged_command(json!({"cmd": "update_pwd", "old": old_pwd, "new": new_pwd}))
            .await
    }

    /// Set the target frequency offset, exclusive range (-10, 100).
    pub async fn set_target_freq(&self, percent: i32) -> Result<Value> {
        if !(-10 < percent && percent < 100) {
            return Err(ApiError::InvalidParameter(format!(
                "Frequency % {percent} is outside of the allowed range (-10, 100)"
            )));
        }
        self.send_privileged_command(json!({"cmd": "set_target_freq", "percent": percent.to_string()}))
            .await
    }

    pub async fn enable_fast_boot(&self) -> Result<Value> {
        self.send_privileged_command(json!({"cmd": "enable_btminer_fast_boot"}))
            .await
    }

    pub async fn disable_fast_boot(&self) -> Result<Value> {
        self.send_privileged_command(json!({"cmd": "disable_btminer_fast_boot"}))
            .await
    }

    pub async fn enable_web_pools(&self) -> Result<Value> {
        self.send_privileged_command(json!({"cmd": "enable_web_pools"}))
            .await
    }

    pub async fn disable_web_pools(&self) -> Result<Value> {
        self.send_privileged_command(json!({"cmd": "disable_web_pools"}))
            .await
    }

    pub async fn set_hostname(&self, hostname: &str) -> Result<Value> {
        self.send_privileged_command(json!({"cmd": "set_hostname", "hostname": hostname}))
            .await
    }

    /// Set the power limit as a percentage, exclusive range (0, 100).
    pub async fn set_power_pct(&self, percent: i32) -> Result<Value> {
        if !(0 < percent && percent < 100) {
            return Err(ApiError::InvalidParameter(format!(
                "Power % {percent} is outside of the allowed range (0, 100)"
            )));
        }
        self.send_privileged_command(json!({"cmd": "set_power_pct", "percent": percent.to_string()}))
            .await
    }

    pub async fn pre_power_on(&self, complete: bool, msg: &str) -> Result<Value> {
        if !PRE_POWER_ON_MESSAGES.contains(&msg) {
            return Err(ApiError::InvalidParameter(format!(
                "Message must be one of {PRE_POWER_ON_MESSAGES:?}, got {msg:?}"
            )));
        }
        self.send_privileged_command(json!({"cmd": "pre_power_on", "complete": flag(complete), "msg": msg}))
            .await
    }

    /// Apply an opaque configuration object as a pool update.
    pub async fn send_config(&self, config: &Value) -> Result<Value> {
        let fields = config.as_object().ok_or_else(|| {
            ApiError::InvalidParameter("configuration must be a JSON object".to_string())
        })?;
        let mut command = fields.clone();
        command.insert("cmd".to_string(), json!("update_pools"));
        self.send_privileged_command(Value::Object(command)).await
    }

    // ── Plain operations ──────────────────────────────────────────

    pub async fn summary(&self) -> Result<Value> {
        self.call("summary", None).await
    }

    pub async fn pools(&self) -> Result<Value> {
        self.call("pools", None).await
    }

    pub async fn devs(&self) -> Result<Value> {
        self.call("devs", None).await
    }

    pub async fn edevs(&self) -> Result<Value> {
        self.call("edevs", None).await
    }

    pub async fn devdetails(&self) -> Result<Value> {
        self.call("devdetails", None).await
    }

    pub async fn get_psu(&self) -> Result<Value> {
        self.call("get_psu", None).await
    }

    pub async fn get_version(&self) -> Result<Value> {
        self.call("get_version", None).await
    }

    pub async fn status(&self) -> Result<Value> {
        self.call("status", None).await
    }

    pub async fn get_miner_info(&self) -> Result<Value> {
        self.call("get_miner_info", None).await
    }
}

#[async_trait]
impl MinerApi for BtMiner {
    fn kind(&self) -> AdapterKind {
        AdapterKind::BtMiner
    }

    fn client(&self) -> &ApiClient {
        &self.client
    }

    fn commands(&self) -> &'static [&'static str] {
        BTMINER_COMMANDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{command_of, spawn_device};
    use crate::privileged;
    use std::sync::{Arc, Mutex};

    const SALT: &str = "BQ5hoXV9";
    const TIME: &str = "7465";
    const NEW_SALT: &str = "qV4C4nTy";

    /// Fake Whatsminer that checks the token and records decrypted commands.
    async fn spawn_whatsminer(
        password: &'static str,
    ) -> (BtMiner, Arc<Mutex<Vec<Value>>>, Arc<Mutex<Vec<String>>>) {
        let decrypted = Arc::new(Mutex::new(Vec::new()));
        let log = decrypted.clone();
        let device_token = PrivilegedToken::derive(password, SALT, TIME, NEW_SALT).unwrap();

        let (client, raw) = spawn_device(move |req| {
            let request: Value = serde_json::from_str(req).unwrap();
            if command_of(req) == "get_token" {
                return json!({
                    "STATUS": "S",
                    "Code": 134,
                    "Msg": {"time": TIME, "salt": SALT, "newsalt": NEW_SALT},
                    "Description": ""
                })
                .to_string();
            }
            let key = device_token.aes_key();
            let reply = match request["data"].as_str().map(|d| privileged::decrypt(&key, d)) {
                Some(Ok(inner)) if inner["token"] == device_token.host_sign.as_str() => {
                    log.lock().unwrap().push(inner);
                    json!({"STATUS": "S", "Code": 131, "Msg": "API command OK", "Description": ""})
                }
                _ => json!({"STATUS": "E", "Code": 132, "Msg": "API command ERROR", "Description": ""}),
            };
            json!({"enc": privileged::encrypt(&key, &reply).unwrap()}).to_string()
        })
        .await;

        (BtMiner::new(client, "admin"), decrypted, raw)
    }

    #[tokio::test]
    async fn test_privileged_round_trip() {
        let (miner, log, _) = spawn_whatsminer("admin").await;
        let reply = miner.reboot().await.unwrap();
        assert_eq!(reply["Msg"], "API command OK");

        let seen = log.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["cmd"], "reboot");
    }

    #[tokio::test]
    async fn test_undecryptable_reply_is_empty() {
        // The device holds a different password, so neither side can read the other.
        let (miner, log, _) = spawn_whatsminer("s3cret").await;
        let reply = miner.power_on().await.unwrap();
        assert_eq!(reply, json!({}));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_pools_fields() {
        let (miner, log, _) = spawn_whatsminer("admin").await;
        miner
            .update_pools(&[
                PoolSpec::new("stratum+tcp://a:3333", "w.1", "x"),
                PoolSpec::new("stratum+tcp://b:3333", "w.2", "y"),
            ])
            .await
            .unwrap();

        let seen = log.lock().unwrap();
        assert_eq!(seen[0]["cmd"], "update_pools");
        assert_eq!(seen[0]["pool2"], "stratum+tcp://b:3333");
        assert_eq!(seen[0]["worker1"], "w.1");
        assert!(seen[0].get("pool3").is_none());
    }

    #[tokio::test]
    async fn test_send_config_passes_fields_through() {
        let (miner, log, _) = spawn_whatsminer("admin").await;
        miner
            .send_config(&json!({"pool1": "stratum+tcp://a:3333", "worker1": "w", "passwd1": "x"}))
            .await
            .unwrap();
        assert_eq!(log.lock().unwrap()[0]["cmd"], "update_pools");
    }

    #[tokio::test]
    async fn test_fresh_token_per_call() {
        let (miner, log, raw) = spawn_whatsminer("admin").await;
        miner.set_power_pct(50).await.unwrap();
        miner.set_target_freq(-5).await.unwrap();

        let token_requests = raw
            .lock()
            .unwrap()
            .iter()
            .filter(|r| command_of(r) == "get_token")
            .count();
        assert_eq!(token_requests, 2);

        let seen = log.lock().unwrap();
        assert_eq!(seen[0]["percent"], "50");
        assert_eq!(seen[1]["percent"], "-5");
    }

    #[tokio::test]
    async fn test_parameter_guards_reject_before_sending() {
        let miner = BtMiner::new(ApiClient::new([127, 0, 0, 1].into()), "admin");
        assert!(matches!(miner.update_pools(&[]).await, Err(ApiError::InvalidParameter(_))));
        assert!(matches!(
            miner.update_pwd("admin", "waytoolong").await,
            Err(ApiError::InvalidParameter(_))
        ));
        assert!(matches!(miner.set_target_freq(-10).await, Err(ApiError::InvalidParameter(_))));
        assert!(matches!(miner.set_target_freq(100).await, Err(ApiError::InvalidParameter(_))));
        assert!(matches!(miner.set_power_pct(0).await, Err(ApiError::InvalidParameter(_))));
        assert!(matches!(
            miner.pre_power_on(true, "go").await,
            Err(ApiError::InvalidParameter(_))
        ));
    }
}
