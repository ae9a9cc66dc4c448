//! Records produced by the collector layer.
//!
//! Values are kept as the device reported them (after light normalization);
//! derivation into directory values happens in the entity modules so that
//! unparsable data can be treated as absent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A device as seen by the collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceRecord {
    pub name: String,
    /// Management IP or chassis MAC, tried when the name is unknown.
    pub addresses: Vec<String>,
    pub serial: Option<String>,
    /// Device type model, e.g. `DCS-7050SX3-48YC8`.
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub platform: Option<String>,
    pub site: Option<String>,
    pub role: Option<String>,
    pub tenant: Option<String>,
    pub status: Option<String>,
}

/// One interface as seen by the collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceRecord {
    pub name: String,
    pub description: Option<String>,
    /// Raw status text (`connected`, `notconnect`, `err-disabled`, ...).
    pub status: Option<String>,
    /// Raw switchport mode (`access`, `trunk`, `routed`).
    pub mode: Option<String>,
    pub mtu: Option<String>,
    pub duplex: Option<String>,
    pub speed: Option<String>,
    /// Hardware descriptor (`SFP+`, `100G QSFP28`, ...).
    pub hardware: Option<String>,
    /// Access VLAN or trunk native VLAN.
    pub untagged_vlan: Option<String>,
    /// Trunk VLAN range string (`"10,20,30-40"`, `"all"`).
    pub tagged_vlans: Option<String>,
    /// Name of the parent LAG, if this is a member.
    pub lag: Option<String>,
    pub mac: Option<String>,
    /// Addresses configured on the interface, `address/len`.
    pub ip_addresses: Vec<String>,
}

/// One IP address as seen by the collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpRecord {
    /// `address/len`, or `address mask`.
    pub address: String,
    pub interface: String,
    pub status: Option<String>,
    pub dns_name: Option<String>,
    /// Set as the device's primary address for its family.
    pub primary: bool,
}

/// How a neighbor identified itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    Hostname,
    Mac,
    Ip,
    Unknown,
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdentityType::Hostname => "hostname",
            IdentityType::Mac => "mac",
            IdentityType::Ip => "ip",
            IdentityType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A neighbor identity value and its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborIdentity {
    pub kind: IdentityType,
    pub value: String,
}

impl NeighborIdentity {
    pub fn new(kind: IdentityType, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// One discovered adjacency (LLDP/CDP neighbor entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborRecord {
    pub local_port: String,
    pub remote_port: String,
    /// Identity tried first.
    pub identity: NeighborIdentity,
    /// Identity tried when the first does not resolve.
    #[serde(default)]
    pub fallback: Option<NeighborIdentity>,
}

/// One inventory module as seen by the collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryRecord {
    pub name: String,
    pub description: Option<String>,
    pub part_id: Option<String>,
    pub serial: Option<String>,
    pub manufacturer: Option<String>,
}

/// A VLAN reported explicitly by the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VlanRecord {
    pub vid: u16,
    pub name: Option<String>,
    pub status: Option<String>,
}

/// Everything collected from one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSnapshot {
    pub device: DeviceRecord,
    pub interfaces: Vec<InterfaceRecord>,
    pub ip_addresses: Vec<IpRecord>,
    pub neighbors: Vec<NeighborRecord>,
    pub inventory: Vec<InventoryRecord>,
    pub vlans: Vec<VlanRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snapshot_from_json() {
        let snapshot: DeviceSnapshot = serde_json::from_str(
            r#"{
                "device": {"name": "sw1", "site": "dc1"},
                "interfaces": [{"name": "Gi0/1", "status": "connected"}],
                "neighbors": [{
                    "local_port": "Gi0/1",
                    "remote_port": "Eth1",
                    "identity": {"kind": "hostname", "value": "sw2.example.net"}
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(snapshot.device.site.as_deref(), Some("dc1"));
        assert_eq!(snapshot.interfaces[0].status.as_deref(), Some("connected"));
        assert_eq!(snapshot.neighbors[0].identity.kind, IdentityType::Hostname);
        assert!(snapshot.neighbors[0].fallback.is_none());
    }
}
