//! Classification engine.
//!
//! Works out which firmware family and hardware model sits behind an
//! address by walking a fixed ladder of probe commands, reading model and
//! family markers out of whatever answers, and mapping the result onto the
//! capability table.
//!
//! Probes for one address run strictly in order. Across repeated attempts
//! the first model and first family observed win; later observations never
//! overwrite them.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rigscan_api::validate::validate;
use rigscan_api::{Adapter, ApiClient};
use rigscan_core::VendorFamily;
use serde_json::Value;
use tokio::time::timeout;

use crate::config::DiscoverConfig;
use crate::identity::{firmware_from_version, MinerIdentity};
use crate::models::resolve;
use crate::shell::{NoShell, ShellChannel};

/// On-device file naming the control board, read when the API is silent.
pub const BOARD_NAME_PATH: &str = "/tmp/sysinfo/board_name";

/// One rung of the probe ladder, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStrategy {
    CombinedBatch,
    DevDetails,
    Version,
    AltVersion,
}

impl ProbeStrategy {
    pub const LADDER: [ProbeStrategy; 4] = [
        Self::CombinedBatch,
        Self::DevDetails,
        Self::Version,
        Self::AltVersion,
    ];

    pub fn command(&self) -> &'static str {
        match self {
            Self::CombinedBatch => "devdetails+version",
            Self::DevDetails => "devdetails",
            Self::Version => "version",
            Self::AltVersion => "get_version",
        }
    }
}

/// Typed result of a single probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeReply {
    Found {
        devdetails: Option<Value>,
        version: Option<Value>,
    },
    /// No data, or the device rejected the command.
    SoftFail(String),
}

impl ProbeReply {
    fn from_response(strategy: ProbeStrategy, data: Value) -> Self {
        let validation = validate(&data);
        if !validation.ok {
            return Self::SoftFail(validation.message.unwrap_or_default());
        }
        match strategy {
            ProbeStrategy::CombinedBatch => {
                let devdetails = data.pointer("/devdetails/0").cloned();
                let version = data.pointer("/version/0").cloned();
                if devdetails.is_none() || version.is_none() {
                    return Self::SoftFail("incomplete batch reply".to_string());
                }
                Self::Found {
                    devdetails,
                    version,
                }
            }
            ProbeStrategy::DevDetails => Self::Found {
                devdetails: Some(data),
                version: None,
            },
            ProbeStrategy::Version | ProbeStrategy::AltVersion => Self::Found {
                devdetails: None,
                version: Some(data),
            },
        }
    }
}

/// Model, family and variant markers read from probe replies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    pub model: Option<String>,
    pub family: Option<VendorFamily>,
    pub variant: Option<String>,
    pub firmware: Option<String>,
}

impl Fingerprint {
    /// Extract markers from the replies that were obtained.
    pub fn extract(devdetails: Option<&Value>, version: Option<&Value>) -> Self {
        let mut fp = Self::default();
        if let Some(dd) = devdetails {
            fp.model = model_from_devdetails(dd);
        }
        if let Some(v) = version {
            fp.read_version(v);
        }
        fp.normalize();
        fp
    }

    fn read_version(&mut self, version: &Value) {
        self.firmware = firmware_from_version(version);
        let block = version.pointer("/VERSION/0");

        if let Some(block) = block.and_then(Value::as_object) {
            // Firmware builds decorate the key, so markers match by substring.
            let keyed = |marker: &str| block.iter().find(|(k, _)| k.contains(marker));
            if keyed("BMMiner").is_some() {
                self.family = Some(VendorFamily::BmMiner);
            } else if keyed("CGMiner").is_some() {
                self.family = Some(VendorFamily::CgMiner);
            } else if keyed("BTMiner").is_some() {
                self.family = Some(VendorFamily::BtMiner);
            } else if let Some((key, value)) = keyed("BOSminer") {
                let plus = key.contains("BOSminer+")
                    || value.as_str().is_some_and(|v| v.contains("plus"));
                self.family = Some(if plus {
                    VendorFamily::BosMinerPlus
                } else {
                    VendorFamily::BosMiner
                });
            }

            if self.model.is_none() {
                if let Some(prod) = block.get("PROD").and_then(Value::as_str) {
                    let mut parts = prod.split('-');
                    self.model = parts.next().map(str::to_string);
                    self.variant = parts.next().map(str::to_string);
                } else if let Some(model) = block.get("MODEL").and_then(Value::as_str) {
                    let mut parts = model.split('-');
                    self.model = parts.next().map(|m| format!("AvalonMiner {m}"));
                    self.variant = parts.next().map(str::to_string);
                }
            }
        }

        if self.family.is_none() {
            let whatsminer = version
                .get("Description")
                .and_then(Value::as_str)
                .is_some_and(|d| d.to_ascii_lowercase().contains("whatsminer"));
            if whatsminer {
                self.family = Some(VendorFamily::BtMiner);
            }
        }

        if self.model.is_none() {
            if let Some(t) = block.and_then(|b| b.get("Type")).and_then(Value::as_str) {
                self.model = Some(t.to_string());
            } else if status_description(version).contains("am2-s17") {
                self.model = Some("Antminer S17".to_string());
            }
        }
    }

    /// Split `M21SV60`-style strings and drop the vendor prefix.
    fn normalize(&mut self) {
        let Some(model) = self.model.take() else {
            return;
        };
        let mut model = model.replace("Bitmain ", "");
        if model.contains('V') {
            let parts: Vec<&str> = model.split('V').collect();
            if parts.len() != 2 {
                tracing::warn!(model = %model, "Unexpected variant marker layout");
            }
            if self.variant.is_none() {
                self.variant = parts.get(1).map(|v| v.to_string()).filter(|v| !v.is_empty());
            }
            model = parts[0].to_string();
        }
        let model = model.trim().to_string();
        self.model = (!model.is_empty()).then_some(model);
    }
}

fn model_from_devdetails(dd: &Value) -> Option<String> {
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    match dd.pointer("/DEVDETAILS/0") {
        Some(first) => non_empty(first.get("Model")).or_else(|| non_empty(first.get("Driver"))),
        None if status_description(dd).contains("s9") => Some("Antminer S9".to_string()),
        None => None,
    }
}

fn status_description(reply: &Value) -> String {
    reply
        .pointer("/STATUS/0/Description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Model for a board name read from the device, if recognised.
pub fn model_from_board_name(board: &str) -> Option<&'static str> {
    match board.trim() {
        "am1-s9" => Some("Antminer S9"),
        "am2-s17" => Some("Antminer S17"),
        _ => None,
    }
}

/// Per-address classification.
#[derive(Clone)]
pub struct Classifier {
    retries: u32,
    timeout: Duration,
    command_timeout: Duration,
    btminer_password: String,
    shell: Arc<dyn ShellChannel>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("retries", &self.retries)
            .field("timeout", &self.timeout)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_config(&DiscoverConfig::default())
    }
}

impl Classifier {
    pub fn from_config(config: &DiscoverConfig) -> Self {
        Self {
            retries: config.identify_retries.max(1),
            timeout: config.identify_timeout(),
            command_timeout: config.command_timeout(),
            btminer_password: config.btminer_password.clone(),
            shell: Arc::new(NoShell),
        }
    }

    pub fn with_shell(mut self, shell: Arc<dyn ShellChannel>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    fn client(&self, ip: Ipv4Addr, port: u16) -> ApiClient {
        ApiClient::new(IpAddr::V4(ip))
            .with_port(port)
            .with_timeout(self.command_timeout)
    }

    /// Send one probe. Transport and decode problems are soft failures.
    pub async fn probe(&self, client: &ApiClient, strategy: ProbeStrategy) -> ProbeReply {
        match client.send_command(strategy.command(), None, true).await {
            Ok(data) => ProbeReply::from_response(strategy, data),
            Err(e) => ProbeReply::SoftFail(e.to_string()),
        }
    }

    /// Walk the ladder until a rung yields data.
    ///
    /// `devdetails` on its own is enough; the version rungs are only
    /// reached when it fails.
    async fn run_ladder(&self, client: &ApiClient) -> (Option<Value>, Option<Value>) {
        for strategy in ProbeStrategy::LADDER {
            match self.probe(client, strategy).await {
                ProbeReply::Found {
                    devdetails,
                    version,
                } => return (devdetails, version),
                ProbeReply::SoftFail(msg) => {
                    tracing::debug!(
                        ip = %client.ip(),
                        command = strategy.command(),
                        reason = %msg,
                        "Probe failed"
                    );
                }
            }
        }
        (None, None)
    }

    /// One full fingerprinting pass.
    pub async fn fingerprint(&self, ip: Ipv4Addr, port: u16) -> Fingerprint {
        let client = self.client(ip, port);
        let (devdetails, version) = self.run_ladder(&client).await;
        let no_data = devdetails.is_none() && version.is_none();
        let mut fp = Fingerprint::extract(devdetails.as_ref(), version.as_ref());

        let bos_without_model = fp.model.is_none()
            && matches!(
                fp.family,
                Some(VendorFamily::BosMiner | VendorFamily::BosMinerPlus)
            );
        if no_data || bos_without_model {
            self.read_board_name(ip, &mut fp).await;
        }
        fp
    }

    async fn read_board_name(&self, ip: Ipv4Addr, fp: &mut Fingerprint) {
        match self.shell.read_file(IpAddr::V4(ip), BOARD_NAME_PATH).await {
            Ok(Some(board)) => {
                tracing::debug!(ip = %ip, board = %board.trim(), "Read board name over shell");
                fp.family = Some(VendorFamily::BosMinerPlus);
                if fp.model.is_none() {
                    fp.model = model_from_board_name(&board).map(str::to_string);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(ip = %ip, error = %e, "Shell fallback failed"),
        }
    }

    /// Classify `ip`, retrying until both model and family are known.
    pub async fn identify(&self, ip: Ipv4Addr, port: u16) -> MinerIdentity {
        let started = Instant::now();
        let mut merged = Fingerprint::default();

        for attempt in 1..=self.retries {
            match timeout(self.timeout, self.fingerprint(ip, port)).await {
                Ok(fp) => {
                    if merged.model.is_none() && fp.model.is_some() {
                        merged.model = fp.model;
                        merged.variant = fp.variant;
                    }
                    if merged.family.is_none() {
                        merged.family = fp.family;
                    }
                    if merged.firmware.is_none() {
                        merged.firmware = fp.firmware;
                    }
                }
                Err(_) => {
                    tracing::debug!(ip = %ip, attempt, "Classification attempt timed out");
                }
            }
            if merged.model.is_some() && merged.family.is_some() {
                break;
            }
        }

        let family = merged.family.unwrap_or(VendorFamily::Unknown);
        let resolution = resolve(merged.model.as_deref(), merged.variant.as_deref(), family);
        let adapter = resolution
            .adapter
            .map(|kind| Adapter::new(kind, self.client(ip, port), &self.btminer_password));

        tracing::info!(
            ip = %ip,
            family = %resolution.family,
            model = ?resolution.model,
            variant = ?resolution.variant,
            duration_ms = started.elapsed().as_millis() as u64,
            "Classified device"
        );

        let identity = MinerIdentity::new(ip, port, resolution, adapter);
        if let Some(fw) = merged.firmware {
            identity.set_firmware_version(fw);
        }
        identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ladder_order() {
        let commands: Vec<&str> = ProbeStrategy::LADDER.iter().map(|s| s.command()).collect();
        assert_eq!(commands, ["devdetails+version", "devdetails", "version", "get_version"]);
    }

    #[test]
    fn test_empty_reply_is_soft_fail() {
        let reply = ProbeReply::from_response(ProbeStrategy::DevDetails, json!({}));
        assert_eq!(reply, ProbeReply::SoftFail("No API data.".to_string()));
    }

    #[test]
    fn test_rejected_reply_is_soft_fail() {
        let data = json!({"STATUS": [{"STATUS": "E", "Msg": "Invalid command"}]});
        let reply = ProbeReply::from_response(ProbeStrategy::Version, data);
        assert_eq!(reply, ProbeReply::SoftFail("Invalid command".to_string()));
    }

    #[test]
    fn test_batch_reply_split() {
        let data = json!({
            "devdetails": [{"STATUS": [{"STATUS": "S"}], "DEVDETAILS": [{"Model": "S19j Pro"}]}],
            "version": [{"STATUS": [{"STATUS": "S"}], "VERSION": [{"BMMiner": "1.0.0"}]}],
            "id": 1
        });
        let ProbeReply::Found { devdetails, version } =
            ProbeReply::from_response(ProbeStrategy::CombinedBatch, data)
        else {
            panic!("expected data");
        };
        assert!(devdetails.unwrap()["DEVDETAILS"].is_array());
        assert!(version.unwrap()["VERSION"].is_array());
    }

    #[test]
    fn test_model_then_driver() {
        let dd = json!({"DEVDETAILS": [{"Model": "", "Driver": "bitmain-s9"}]});
        assert_eq!(model_from_devdetails(&dd).as_deref(), Some("bitmain-s9"));
        let dd = json!({"DEVDETAILS": [{"Model": "Antminer S19"}]});
        assert_eq!(model_from_devdetails(&dd).as_deref(), Some("Antminer S19"));
    }

    #[test]
    fn test_legacy_s9_description() {
        let dd = json!({"STATUS": [{"STATUS": "S", "Description": "cgminer s9 fw"}]});
        assert_eq!(model_from_devdetails(&dd).as_deref(), Some("Antminer S9"));
    }

    #[test]
    fn test_family_markers() {
        let cases = [
            (json!({"VERSION": [{"BMMiner": "2.0"}]}), VendorFamily::BmMiner),
            (json!({"VERSION": [{"CGMiner": "4.9"}]}), VendorFamily::CgMiner),
            (json!({"VERSION": [{"BTMiner": "1.0"}]}), VendorFamily::BtMiner),
            (json!({"VERSION": [{"BOSminer": "0.2.0"}]}), VendorFamily::BosMiner),
            (json!({"VERSION": [{"BOSminer": "0.2.0-plus"}]}), VendorFamily::BosMinerPlus),
            (json!({"VERSION": [{"BOSminer+": "0.9"}]}), VendorFamily::BosMinerPlus),
            (json!({"Description": "whatsminer v1.1"}), VendorFamily::BtMiner),
        ];
        for (version, family) in cases {
            let fp = Fingerprint::extract(None, Some(&version));
            assert_eq!(fp.family, Some(family), "{version}");
        }
    }

    #[test]
    fn test_family_markers_match_decorated_keys() {
        let cases = [
            (json!({"VERSION": [{"BMMiner Version": "2.0"}]}), VendorFamily::BmMiner),
            (json!({"VERSION": [{"CGMiner-avalon": "4.11.1"}]}), VendorFamily::CgMiner),
            (json!({"VERSION": [{"BOSminer+ build": "0.9"}]}), VendorFamily::BosMinerPlus),
            (json!({"VERSION": [{"API": "3.7", "BMMiner_CGMiner": "1.0"}]}), VendorFamily::BmMiner),
        ];
        for (version, family) in cases {
            let fp = Fingerprint::extract(None, Some(&version));
            assert_eq!(fp.family, Some(family), "{version}");
        }
    }

    #[test]
    fn test_variant_split_and_prefix_strip() {
        let dd = json!({"DEVDETAILS": [{"Model": "M21SV60"}]});
        let fp = Fingerprint::extract(Some(&dd), None);
        assert_eq!(fp.model.as_deref(), Some("M21S"));
        assert_eq!(fp.variant.as_deref(), Some("60"));

        let dd = json!({"DEVDETAILS": [{"Model": "Bitmain S9"}]});
        let fp = Fingerprint::extract(Some(&dd), None);
        assert_eq!(fp.model.as_deref(), Some("S9"));
    }

    #[test]
    fn test_avalon_markers() {
        let version = json!({"VERSION": [{"CGMiner": "4.11.1", "PROD": "AvalonMiner 1047-G2"}]});
        let fp = Fingerprint::extract(None, Some(&version));
        assert_eq!(fp.model.as_deref(), Some("AvalonMiner 1047"));
        assert_eq!(fp.variant.as_deref(), Some("G2"));

        let version = json!({"VERSION": [{"CGMiner": "4.11.1", "MODEL": "1066-40"}]});
        let fp = Fingerprint::extract(None, Some(&version));
        assert_eq!(fp.model.as_deref(), Some("AvalonMiner 1066"));
        assert_eq!(fp.variant.as_deref(), Some("40"));
    }

    #[test]
    fn test_type_and_s17_fallbacks() {
        let version = json!({"VERSION": [{"BMMiner": "2.0", "Type": "Antminer S19 Pro"}]});
        let fp = Fingerprint::extract(None, Some(&version));
        assert_eq!(fp.model.as_deref(), Some("Antminer S19 Pro"));

        let version = json!({
            "STATUS": [{"STATUS": "S", "Description": "BOSminer am2-s17"}],
            "VERSION": [{"BOSminer": "0.2.0"}]
        });
        let fp = Fingerprint::extract(None, Some(&version));
        assert_eq!(fp.model.as_deref(), Some("Antminer S17"));
    }

    #[test]
    fn test_board_names() {
        assert_eq!(model_from_board_name("am1-s9\n"), Some("Antminer S9"));
        assert_eq!(model_from_board_name("am2-s17"), Some("Antminer S17"));
        assert_eq!(model_from_board_name("am3-s19"), None);
    }
}
