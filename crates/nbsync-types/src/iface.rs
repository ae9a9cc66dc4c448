//! Interface naming and attribute parsing.
//!
//! Devices abbreviate interface names inconsistently (`Gi0/1` in neighbor
//! tables, `GigabitEthernet0/1` in interface listings) and report speed,
//! duplex and status as free-form text. This module reduces both to the
//! canonical values the directory stores.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::VlanSet;

/// Known interface name prefixes: (abbreviation, canonical long form).
///
/// Longer abbreviations come first so that `Twe` wins over `Tw`.
const NAME_PREFIXES: &[(&str, &str)] = &[
    ("Twe", "TwentyFiveGigE"),
    ("Eth", "Ethernet"),
    ("Gi", "GigabitEthernet"),
    ("Te", "TenGigabitEthernet"),
    ("Tw", "TwoGigabitEthernet"),
    ("Fa", "FastEthernet"),
    ("Fo", "FortyGigabitEthernet"),
    ("Hu", "HundredGigE"),
    ("Po", "Port-channel"),
    ("BE", "Bundle-Ether"),
    ("Vl", "Vlan"),
    ("Lo", "Loopback"),
    ("Tu", "Tunnel"),
    ("Ma", "Management"),
    ("Et", "Ethernet"),
];

/// Prefixes (lower-case, canonical or common vendor forms) of aggregate links.
const LAG_PREFIXES: &[&str] = &[
    "port-channel",
    "portchannel",
    "bundle-ether",
    "ae",
    "bond",
    "lag",
];

/// Prefixes (lower-case) of interfaces with no physical port behind them.
const VIRTUAL_PREFIXES: &[&str] = &[
    "vlan", "loopback", "tunnel", "null", "nve", "bdi", "irb", "vxlan", "lo",
];

static SPEED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*([kmgt]?)(?:b(?:it)?(?:/s|ps)?)?$")
        .expect("Invalid regex pattern")
});

fn split_prefix(name: &str) -> (&str, &str) {
    let idx = name
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(name.len());
    (&name[..idx], &name[idx..])
}

/// Returns the canonical long form of an interface name.
///
/// Unknown prefixes are returned unchanged.
///
/// ```
/// use nbsync_types::iface::canonical_name;
///
/// assert_eq!(canonical_name("Gi0/1"), "GigabitEthernet0/1");
/// assert_eq!(canonical_name("po10"), "Port-channel10");
/// assert_eq!(canonical_name("GigabitEthernet0/1"), "GigabitEthernet0/1");
/// ```
pub fn canonical_name(name: &str) -> String {
    let (prefix, rest) = split_prefix(name.trim());
    if prefix.is_empty() {
        return name.trim().to_string();
    }
    for (short, long) in NAME_PREFIXES {
        if prefix.eq_ignore_ascii_case(short) || prefix.eq_ignore_ascii_case(long) {
            return format!("{}{}", long, rest);
        }
    }
    name.trim().to_string()
}

/// Returns true if two names refer to the same interface once abbreviations
/// are expanded.
pub fn names_match(a: &str, b: &str) -> bool {
    canonical_name(a) == canonical_name(b)
}

/// Returns true if the name denotes an aggregate link (LAG).
pub fn is_lag_name(name: &str) -> bool {
    let canonical = canonical_name(name).to_ascii_lowercase();
    let (prefix, rest) = split_prefix(&canonical);
    !rest.is_empty()
        && !rest.contains('.')
        && LAG_PREFIXES.iter().any(|p| prefix == *p)
}

/// Coarse classification of an interface by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceClass {
    /// Aggregate link (port-channel, bundle, bond).
    Lag,
    /// Logical interface without a physical port (SVI, loopback, tunnel,
    /// sub-interface).
    Virtual,
    /// Out-of-band management port.
    Management,
    /// Front-panel physical port.
    Physical,
}

impl InterfaceClass {
    /// Classifies an interface by its name.
    pub fn of(name: &str) -> Self {
        if is_lag_name(name) {
            return InterfaceClass::Lag;
        }
        let canonical = canonical_name(name);
        if canonical.contains('.') {
            return InterfaceClass::Virtual;
        }
        let lower = canonical.to_ascii_lowercase();
        let (prefix, _) = split_prefix(&lower);
        if VIRTUAL_PREFIXES.iter().any(|p| prefix == *p) {
            return InterfaceClass::Virtual;
        }
        if prefix.starts_with("mgmt") || prefix.starts_with("management") || prefix == "fxp" {
            return InterfaceClass::Management;
        }
        InterfaceClass::Physical
    }

    /// Returns true if cables may terminate on this class of interface.
    pub const fn is_cableable(&self) -> bool {
        matches!(self, InterfaceClass::Physical | InterfaceClass::Management)
    }
}

/// Derives the directory interface type slug.
///
/// The hardware descriptor reported by the device wins, then the canonical
/// name prefix, then the negotiated speed. Unknown interfaces map to `other`.
pub fn interface_type(name: &str, hardware: Option<&str>, speed_kbps: Option<u64>) -> &'static str {
    match InterfaceClass::of(name) {
        InterfaceClass::Lag => return "lag",
        InterfaceClass::Virtual => return "virtual",
        _ => {}
    }

    if let Some(hw) = hardware.map(|h| h.to_ascii_lowercase()) {
        if hw.contains("qsfp28") || hw.contains("100g") {
            return "100gbase-x-qsfp28";
        }
        if hw.contains("qsfp") || hw.contains("40g") {
            return "40gbase-x-qsfpp";
        }
        if hw.contains("sfp28") || hw.contains("25g") {
            return "25gbase-x-sfp28";
        }
        if hw.contains("sfp+") || hw.contains("10g") || hw.contains("ten gig") {
            return "10gbase-x-sfpp";
        }
        if hw.contains("sfp") {
            return "1000base-x-sfp";
        }
    }

    let canonical = canonical_name(name);
    let (prefix, _) = split_prefix(&canonical);
    let by_name = match prefix {
        "FastEthernet" => Some("100base-tx"),
        "GigabitEthernet" => Some("1000base-t"),
        "TwoGigabitEthernet" => Some("2.5gbase-t"),
        "TenGigabitEthernet" => Some("10gbase-x-sfpp"),
        "TwentyFiveGigE" => Some("25gbase-x-sfp28"),
        "FortyGigabitEthernet" => Some("40gbase-x-qsfpp"),
        "HundredGigE" => Some("100gbase-x-qsfp28"),
        _ => None,
    };
    if let Some(t) = by_name {
        return t;
    }

    match speed_kbps {
        Some(100_000) => "100base-tx",
        Some(1_000_000) => "1000base-t",
        Some(2_500_000) => "2.5gbase-t",
        Some(10_000_000) => "10gbase-x-sfpp",
        Some(25_000_000) => "25gbase-x-sfp28",
        Some(40_000_000) => "40gbase-x-qsfpp",
        Some(100_000_000) => "100gbase-x-qsfp28",
        _ => "other",
    }
}

/// Parses a device speed string into kilobits per second.
///
/// Bare numbers are megabits (`"1000"`, `"a-1000"`); unit suffixes are
/// honored (`"10Gb/s"`, `"100Mbps"`, `"2.5G"`). `auto` and anything
/// unparsable yield `None`.
pub fn parse_speed_kbps(raw: &str) -> Option<u64> {
    let lower = raw.trim().to_ascii_lowercase();
    let value = lower.strip_prefix("a-").unwrap_or(&lower);
    if value.is_empty() || value == "auto" {
        return None;
    }
    let caps = SPEED_RE.captures(value)?;
    let number: f64 = caps.get(1)?.as_str().parse().ok()?;
    let factor = match caps.get(2).map(|m| m.as_str()).unwrap_or("") {
        "k" => 1.0,
        "" | "m" => 1_000.0,
        "g" => 1_000_000.0,
        "t" => 1_000_000_000.0,
        _ => return None,
    };
    let kbps = (number * factor).round();
    if kbps <= 0.0 || !kbps.is_finite() {
        return None;
    }
    Some(kbps as u64)
}

/// Interface duplex setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Duplex {
    Full,
    Half,
    Auto,
}

impl Duplex {
    /// Parses a device duplex string (`full`, `a-full`, `Half-duplex`, `auto`).
    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        let value = lower.strip_prefix("a-").unwrap_or(&lower);
        let value = value.trim_end_matches("-duplex").trim_end_matches(" duplex");
        match value {
            "full" | "fdx" => Some(Duplex::Full),
            "half" | "hdx" => Some(Duplex::Half),
            "auto" => Some(Duplex::Auto),
            _ => None,
        }
    }

    /// Returns the directory value.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Duplex::Full => "full",
            Duplex::Half => "half",
            Duplex::Auto => "auto",
        }
    }
}

impl fmt::Display for Duplex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 802.1Q switchport mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwitchportMode {
    /// Single untagged VLAN.
    Access,
    /// Trunk carrying an explicit VLAN list.
    Tagged,
    /// Trunk carrying every VLAN.
    TaggedAll,
    /// Layer-3 port; the directory stores no mode.
    Routed,
}

impl SwitchportMode {
    /// Interprets a device mode string.
    ///
    /// `trunk_vlans` decides between `Tagged` and `TaggedAll` for trunks.
    pub fn from_device(raw: &str, trunk_vlans: Option<&VlanSet>) -> Option<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        match lower.as_str() {
            "access" | "static access" | "static-access" => Some(SwitchportMode::Access),
            "trunk" | "tagged" | "dot1q" | "802.1q" => {
                if trunk_vlans.map(|v| v.is_all()).unwrap_or(false) {
                    Some(SwitchportMode::TaggedAll)
                } else {
                    Some(SwitchportMode::Tagged)
                }
            }
            "tagged-all" => Some(SwitchportMode::TaggedAll),
            "routed" | "layer3" | "l3" | "none" => Some(SwitchportMode::Routed),
            _ => None,
        }
    }

    /// Parses the value stored in the directory (`None` means routed).
    pub fn from_directory(raw: Option<&str>) -> Option<Self> {
        match raw {
            None | Some("") => Some(SwitchportMode::Routed),
            Some("access") => Some(SwitchportMode::Access),
            Some("tagged") => Some(SwitchportMode::Tagged),
            Some("tagged-all") => Some(SwitchportMode::TaggedAll),
            Some(_) => None,
        }
    }

    /// Returns the directory value, `None` for routed ports.
    pub const fn directory_value(&self) -> Option<&'static str> {
        match self {
            SwitchportMode::Access => Some("access"),
            SwitchportMode::Tagged => Some("tagged"),
            SwitchportMode::TaggedAll => Some("tagged-all"),
            SwitchportMode::Routed => None,
        }
    }
}

/// Interpretation of a device status string as the directory's `enabled` flag.
///
/// The same status text yields different answers under each policy:
/// `notconnect` is enabled administratively but has no link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnabledMode {
    /// Enabled unless explicitly disabled or error-disabled.
    #[default]
    #[serde(alias = "administrative")]
    Admin,
    /// Enabled only if the link is operationally up.
    Link,
}

impl EnabledMode {
    /// Maps a raw status string to the enabled flag under this policy.
    ///
    /// ```
    /// use nbsync_types::EnabledMode;
    ///
    /// assert!(EnabledMode::Admin.is_enabled("notconnect"));
    /// assert!(!EnabledMode::Link.is_enabled("notconnect"));
    /// assert!(!EnabledMode::Admin.is_enabled("err-disabled"));
    /// ```
    pub fn is_enabled(&self, status: &str) -> bool {
        let s = status.trim().to_ascii_lowercase();
        match self {
            EnabledMode::Admin => {
                let disabled = s.contains("disabled")
                    || s.starts_with("err")
                    || (s.starts_with("admin") && s.contains("down"))
                    || s == "shutdown";
                !disabled
            }
            EnabledMode::Link => {
                s == "up" || s == "connected" || s.starts_with("up ") || s.starts_with("up(")
            }
        }
    }
}
