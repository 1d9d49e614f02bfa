//! Resolved device identity.

use std::net::Ipv4Addr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use rigscan_api::Adapter;
use rigscan_core::{AdapterKind, HardwareSpec, VendorFamily};
use serde::Serialize;
use serde_json::Value;

use crate::models::Resolution;

/// What a device is and how to talk to it.
///
/// Immutable once built, except the firmware version which is filled in at
/// most once, either during classification or on first request.
#[derive(Debug)]
pub struct MinerIdentity {
    address: Ipv4Addr,
    port: u16,
    family: VendorFamily,
    model: Option<String>,
    variant: Option<String>,
    spec: HardwareSpec,
    adapter: Option<Adapter>,
    firmware_version: OnceLock<String>,
    identified_at: DateTime<Utc>,
}

/// Flat, serializable view of a [`MinerIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    pub address: Ipv4Addr,
    pub port: u16,
    pub family: VendorFamily,
    pub model: Option<String>,
    pub variant: Option<String>,
    pub adapter: Option<AdapterKind>,
    pub firmware_version: Option<String>,
    pub nominal_chips: Option<u32>,
    pub fan_count: u8,
    pub hashboards: u8,
    pub identified_at: DateTime<Utc>,
}

impl MinerIdentity {
    pub fn new(address: Ipv4Addr, port: u16, resolution: Resolution, adapter: Option<Adapter>) -> Self {
        Self {
            address,
            port,
            family: resolution.family,
            model: resolution.model,
            variant: resolution.variant,
            spec: resolution.spec,
            adapter,
            firmware_version: OnceLock::new(),
            identified_at: Utc::now(),
        }
    }

    pub fn unknown(address: Ipv4Addr, port: u16) -> Self {
        Self::new(address, port, Resolution::unknown(None, None), None)
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn family(&self) -> VendorFamily {
        self.family
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub fn spec(&self) -> HardwareSpec {
        self.spec
    }

    pub fn adapter(&self) -> Option<&Adapter> {
        self.adapter.as_ref()
    }

    pub fn identified_at(&self) -> DateTime<Utc> {
        self.identified_at
    }

    pub fn is_unknown(&self) -> bool {
        self.adapter.is_none()
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.firmware_version.get().map(String::as_str)
    }

    /// Record the firmware version. Returns `false` if one was already set.
    pub fn set_firmware_version(&self, version: impl Into<String>) -> bool {
        self.firmware_version.set(version.into()).is_ok()
    }

    /// Firmware version, querying the device the first time it is needed.
    pub async fn fetch_firmware_version(&self) -> Option<&str> {
        if let Some(v) = self.firmware_version.get() {
            return Some(v.as_str());
        }
        let adapter = self.adapter.as_ref()?;
        match adapter.version().await {
            Ok(reply) => {
                if let Some(v) = firmware_from_version(&reply) {
                    self.set_firmware_version(v);
                }
            }
            Err(e) => {
                tracing::debug!(ip = %self.address, error = %e, "Version query failed");
            }
        }
        self.firmware_version()
    }

    pub fn record(&self) -> IdentityRecord {
        IdentityRecord {
            address: self.address,
            port: self.port,
            family: self.family,
            model: self.model.clone(),
            variant: self.variant.clone(),
            adapter: self.adapter.as_ref().map(Adapter::kind),
            firmware_version: self.firmware_version().map(str::to_string),
            nominal_chips: self.spec.nominal_chips,
            fan_count: self.spec.fan_count,
            hashboards: self.spec.hashboards,
            identified_at: self.identified_at,
        }
    }
}

impl Serialize for MinerIdentity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.record().serialize(serializer)
    }
}

/// Firmware version from a `version` or `get_version` reply.
pub fn firmware_from_version(reply: &Value) -> Option<String> {
    if let Some(fw) = reply.pointer("/Msg/fw_ver").and_then(Value::as_str) {
        return Some(fw.to_string());
    }
    let block = reply.pointer("/VERSION/0")?;
    ["BOSminer+", "BOSminer", "BMMiner", "CGMiner", "BTMiner"]
        .iter()
        .find_map(|key| block.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resolve;
    use serde_json::json;

    #[test]
    fn test_firmware_version_set_once() {
        let identity = MinerIdentity::unknown(Ipv4Addr::LOCALHOST, 4028);
        assert!(identity.set_firmware_version("4.11.1"));
        assert!(!identity.set_firmware_version("5.0"));
        assert_eq!(identity.firmware_version(), Some("4.11.1"));
    }

    #[test]
    fn test_firmware_from_version_shapes() {
        let cg = json!({"VERSION": [{"CGMiner": "4.9.0", "API": "3.7"}]});
        assert_eq!(firmware_from_version(&cg).as_deref(), Some("4.9.0"));
        let bt = json!({"STATUS": "S", "Msg": {"api_ver": "2.0.2", "fw_ver": "20210322.22.REL"}});
        assert_eq!(firmware_from_version(&bt).as_deref(), Some("20210322.22.REL"));
        assert_eq!(firmware_from_version(&json!({})), None);
    }

    #[test]
    fn test_record_serializes() {
        let resolution = resolve(Some("M21S"), Some("60"), VendorFamily::BtMiner);
        let identity = MinerIdentity::new(Ipv4Addr::new(10, 0, 0, 5), 4028, resolution, None);
        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(value["address"], "10.0.0.5");
        assert_eq!(value["family"], "BTMiner");
        assert_eq!(value["nominal_chips"], 105);
        assert!(value["firmware_version"].is_null());
    }
}
