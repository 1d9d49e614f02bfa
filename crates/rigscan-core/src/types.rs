//! Core domain types for miner identification.
//!
//! A device is described by the firmware family it runs, the adapter that
//! speaks that family's dialect, and a static hardware specification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ── Vendor family ─────────────────────────────────────────────────

/// Management API dialect reported by device firmware.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VendorFamily {
    #[serde(rename = "CGMiner")]
    CgMiner,
    #[serde(rename = "BMMiner")]
    BmMiner,
    #[serde(rename = "BOSMiner")]
    BosMiner,
    #[serde(rename = "BOSMiner+")]
    BosMinerPlus,
    #[serde(rename = "BTMiner")]
    BtMiner,
    Unknown,
}

impl VendorFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CgMiner => "CGMiner",
            Self::BmMiner => "BMMiner",
            Self::BosMiner => "BOSMiner",
            Self::BosMinerPlus => "BOSMiner+",
            Self::BtMiner => "BTMiner",
            Self::Unknown => "Unknown",
        }
    }

    /// Adapter used to talk to a device running this family, if any.
    ///
    /// Both Braiins OS generations answer the same command surface.
    pub fn adapter_kind(&self) -> Option<AdapterKind> {
        match self {
            Self::CgMiner => Some(AdapterKind::CgMiner),
            Self::BmMiner => Some(AdapterKind::BmMiner),
            Self::BosMiner | Self::BosMinerPlus => Some(AdapterKind::BosMiner),
            Self::BtMiner => Some(AdapterKind::BtMiner),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for VendorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VendorFamily {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cgminer" => Ok(Self::CgMiner),
            "bmminer" => Ok(Self::BmMiner),
            "bosminer" => Ok(Self::BosMiner),
            "bosminer+" => Ok(Self::BosMinerPlus),
            "btminer" => Ok(Self::BtMiner),
            "unknown" => Ok(Self::Unknown),
            _ => Err(CoreError::UnknownFamily(s.to_string())),
        }
    }
}

// ── Adapter kind ──────────────────────────────────────────────────

/// The closed set of management API implementations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    CgMiner,
    BmMiner,
    BosMiner,
    BtMiner,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CgMiner => "cgminer",
            Self::BmMiner => "bmminer",
            Self::BosMiner => "bosminer",
            Self::BtMiner => "btminer",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cgminer" => Ok(Self::CgMiner),
            "bmminer" => Ok(Self::BmMiner),
            "bosminer" => Ok(Self::BosMiner),
            "btminer" => Ok(Self::BtMiner),
            _ => Err(CoreError::UnknownAdapter(s.to_string())),
        }
    }
}

// ── Hardware spec ─────────────────────────────────────────────────

/// Static hardware description of a miner model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HardwareSpec {
    /// Expected compute chips per hashboard; `None` when unpublished.
    pub nominal_chips: Option<u32>,
    pub fan_count: u8,
    pub hashboards: u8,
}

impl HardwareSpec {
    pub const fn new(nominal_chips: Option<u32>, fan_count: u8, hashboards: u8) -> Self {
        Self {
            nominal_chips,
            fan_count,
            hashboards,
        }
    }

    /// Chips expected across every board, used to spot degraded boards.
    pub fn total_chips(&self) -> Option<u32> {
        self.nominal_chips.map(|c| c * u32::from(self.hashboards))
    }
}
