//! Static hardware capability table.
//!
//! Keyed by the model string a device reports after post-processing
//! (`Antminer S19j Pro`, `M21S`, `AvalonMiner 1066`). Each entry lists the
//! firmware families the model is known to run, the one to assume when the
//! reported family is unsupported, and the nominal hardware layout.
//! Whatsminer variants carry their own chip counts.

use rigscan_core::{AdapterKind, HardwareSpec, VendorFamily};
use serde::Serialize;

use rigscan_core::VendorFamily::{BmMiner, BosMiner, BosMinerPlus, BtMiner, CgMiner};

/// One row of the capability table.
#[derive(Debug, Clone, Copy)]
pub struct ModelEntry {
    pub model: &'static str,
    /// Families the model runs; the first is the default.
    pub families: &'static [VendorFamily],
    /// Known variant suffixes and their chip count overrides.
    pub variants: &'static [(&'static str, Option<u32>)],
    pub spec: HardwareSpec,
}

impl ModelEntry {
    pub fn default_family(&self) -> VendorFamily {
        self.families[0]
    }

    pub fn runs(&self, family: VendorFamily) -> bool {
        self.families.contains(&family)
    }

    /// Spec for `variant`, falling back to the base model's.
    pub fn spec_for(&self, variant: Option<&str>) -> HardwareSpec {
        let Some(variant) = variant else {
            return self.spec;
        };
        match self
            .variants
            .iter()
            .find(|(v, _)| v.eq_ignore_ascii_case(variant))
        {
            Some(&(_, chips)) => HardwareSpec {
                nominal_chips: chips,
                ..self.spec
            },
            None => self.spec,
        }
    }

    pub fn has_variant(&self, variant: &str) -> bool {
        self.variants
            .iter()
            .any(|(v, _)| v.eq_ignore_ascii_case(variant))
    }
}

const BOS_S9: &[VendorFamily] = &[BosMinerPlus, BosMiner, BmMiner, CgMiner];
const BMMINER: &[VendorFamily] = &[BmMiner];
const ANTMINER: &[VendorFamily] = &[BmMiner, BosMinerPlus, CgMiner];
const WHATSMINER: &[VendorFamily] = &[BtMiner];
const AVALON: &[VendorFamily] = &[CgMiner];

const fn antminer(model: &'static str, families: &'static [VendorFamily], chips: Option<u32>) -> ModelEntry {
    ModelEntry {
        model,
        families,
        variants: &[],
        spec: HardwareSpec::new(chips, 4, 3),
    }
}

const fn whatsminer(
    model: &'static str,
    chips: Option<u32>,
    variants: &'static [(&'static str, Option<u32>)],
) -> ModelEntry {
    ModelEntry {
        model,
        families: WHATSMINER,
        variants,
        spec: HardwareSpec::new(chips, 2, 3),
    }
}

const fn avalon(model: &'static str) -> ModelEntry {
    ModelEntry {
        model,
        families: AVALON,
        variants: &[],
        spec: HardwareSpec::new(None, 4, 3),
    }
}

pub static MODELS: &[ModelEntry] = &[
    ModelEntry {
        model: "Antminer S9",
        families: BOS_S9,
        variants: &[],
        spec: HardwareSpec::new(Some(63), 2, 3),
    },
    antminer("Antminer S9i", BMMINER, Some(63)),
    antminer("Antminer S17", ANTMINER, Some(48)),
    antminer("Antminer S17+", ANTMINER, Some(65)),
    antminer("Antminer S17 Pro", ANTMINER, Some(48)),
    antminer("Antminer S17e", ANTMINER, Some(135)),
    antminer("Antminer T17", ANTMINER, None),
    antminer("Antminer T17+", ANTMINER, None),
    antminer("Antminer T17e", ANTMINER, None),
    antminer("Antminer S19", ANTMINER, Some(76)),
    antminer("Antminer S19 Pro", ANTMINER, Some(114)),
    antminer("Antminer S19j", ANTMINER, Some(114)),
    antminer("Antminer S19j Pro", ANTMINER, Some(126)),
    antminer("Antminer S19a", BMMINER, Some(72)),
    antminer("Antminer T19", ANTMINER, None),
    whatsminer("M20S", None, &[("10", Some(105)), ("20", Some(66))]),
    whatsminer("M20S+", None, &[]),
    whatsminer("M21", None, &[]),
    whatsminer("M21S", None, &[("20", Some(66)), ("60", Some(105))]),
    whatsminer("M21S+", None, &[]),
    whatsminer(
        "M30S",
        Some(148),
        &[
            ("10", Some(148)),
            ("50", Some(156)),
            ("G20", Some(70)),
            ("E20", Some(111)),
            ("E10", Some(105)),
        ],
    ),
    whatsminer("M30S+", None, &[("F20", None), ("E40", None), ("G60", None)]),
    whatsminer("M30S++", None, &[("G30", Some(111)), ("G40", Some(117))]),
    whatsminer(
        "M31S",
        None,
        &[
            ("10", Some(105)),
            ("20", Some(111)),
            ("60", Some(105)),
            ("70", Some(111)),
        ],
    ),
    whatsminer("M31S+", None, &[("E20", Some(78))]),
    whatsminer("M32S", None, &[]),
    avalon("AvalonMiner 721"),
    avalon("AvalonMiner 741"),
    avalon("AvalonMiner 761"),
    avalon("AvalonMiner 821"),
    avalon("AvalonMiner 841"),
    avalon("AvalonMiner 851"),
    avalon("AvalonMiner 921"),
    avalon("AvalonMiner 1026"),
    avalon("AvalonMiner 1047"),
    avalon("AvalonMiner 1066"),
];

/// Case-insensitive lookup by model string.
pub fn lookup(model: &str) -> Option<&'static ModelEntry> {
    let model = model.trim();
    MODELS.iter().find(|e| e.model.eq_ignore_ascii_case(model))
}

/// Outcome of mapping a fingerprint onto the capability table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub model: Option<String>,
    pub variant: Option<String>,
    pub family: VendorFamily,
    /// `None` means the device is Unknown.
    pub adapter: Option<AdapterKind>,
    pub spec: HardwareSpec,
}

impl Resolution {
    pub fn unknown(model: Option<&str>, variant: Option<&str>) -> Self {
        Self {
            model: model.map(str::to_string),
            variant: variant.map(str::to_string),
            family: VendorFamily::Unknown,
            adapter: None,
            spec: HardwareSpec::default(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.adapter.is_none()
    }
}

/// Guess the Avalon model for a string the table does not carry.
fn avalon_fallback(model: &str) -> Option<&'static ModelEntry> {
    let lower = model.to_ascii_lowercase();
    if !lower.contains("avalon") {
        return None;
    }
    let guess = if lower.contains("avalon10") {
        "AvalonMiner 1066"
    } else {
        "AvalonMiner 821"
    };
    lookup(guess)
}

/// Resolve a fingerprint to an adapter and hardware spec.
///
/// - Known model: the reported family if the model runs it, otherwise the
///   model's default family.
/// - Unknown model: Unknown, except Avalon strings which fall back to the
///   closest Avalon entry.
/// - No model: the generic adapter for the reported family, if any.
pub fn resolve(model: Option<&str>, variant: Option<&str>, family: VendorFamily) -> Resolution {
    let Some(model) = model else {
        return match family.adapter_kind() {
            Some(adapter) => Resolution {
                model: None,
                variant: variant.map(str::to_string),
                family,
                adapter: Some(adapter),
                spec: HardwareSpec::default(),
            },
            None => Resolution::unknown(None, variant),
        };
    };

    let entry = match lookup(model).or_else(|| avalon_fallback(model)) {
        Some(entry) => entry,
        None => {
            tracing::debug!(model, family = %family, "Model not in capability table");
            return Resolution::unknown(Some(model), variant);
        }
    };

    let family = if entry.runs(family) {
        family
    } else {
        entry.default_family()
    };
    if let Some(v) = variant {
        if !entry.variants.is_empty() && !entry.has_variant(v) {
            tracing::debug!(model = entry.model, variant = v, "Unrecognised variant, using base spec");
        }
    }

    Resolution {
        model: Some(entry.model.to_string()),
        variant: variant.map(str::to_string),
        family,
        adapter: family.adapter_kind(),
        spec: entry.spec_for(variant),
    }
}
