//! Snapshot fixtures for common device shapes
//!
//! Provides reusable collected-state builders for reconciliation tests

use nbsync_core::EntityKind;
use nbsync_orch::{
    DeviceRecord, DeviceSnapshot, IdentityType, InterfaceRecord, InventoryRecord, IpRecord,
    NeighborIdentity, NeighborRecord, VlanRecord,
};
use std::collections::HashMap;

/// Builds the collected state of one device
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    snapshot: DeviceSnapshot,
}

impl SnapshotBuilder {
    /// A device with every reference the device sync needs
    pub fn device(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            snapshot: DeviceSnapshot {
                device: DeviceRecord {
                    serial: Some(format!("SN-{}", name.to_ascii_uppercase())),
                    model: Some("C9300-48P".into()),
                    manufacturer: Some("Cisco".into()),
                    site: Some("dc1".into()),
                    role: Some("access".into()),
                    name,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    /// A device that only carries its name
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            snapshot: DeviceSnapshot {
                device: DeviceRecord {
                    name: name.into(),
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.snapshot.device.site = Some(site.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.snapshot.device.addresses.push(address.into());
        self
    }

    pub fn with_interface(mut self, interface: InterfaceRecord) -> Self {
        self.snapshot.interfaces.push(interface);
        self
    }

    /// Add multiple interfaces
    pub fn with_interfaces<I>(mut self, interfaces: I) -> Self
    where
        I: IntoIterator<Item = InterfaceRecord>,
    {
        self.snapshot.interfaces.extend(interfaces);
        self
    }

    /// Adds an address on `interface`, optionally as the device's primary
    pub fn with_ip(mut self, interface: &str, address: &str, primary: bool) -> Self {
        self.snapshot.ip_addresses.push(IpRecord {
            address: address.into(),
            interface: interface.into(),
            primary,
            ..Default::default()
        });
        self
    }

    pub fn with_neighbor(mut self, neighbor: NeighborRecord) -> Self {
        self.snapshot.neighbors.push(neighbor);
        self
    }

    pub fn with_inventory(mut self, item: InventoryRecord) -> Self {
        self.snapshot.inventory.push(item);
        self
    }

    pub fn with_vlan(mut self, vid: u16, name: &str) -> Self {
        self.snapshot.vlans.push(VlanRecord {
            vid,
            name: Some(name.into()),
            ..Default::default()
        });
        self
    }

    pub fn build(self) -> DeviceSnapshot {
        self.snapshot
    }
}

/// Common interface fixtures
pub mod interface_fixtures {
    use super::*;

    fn named(name: &str) -> InterfaceRecord {
        InterfaceRecord {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Access port, link up
    pub fn access_port(name: &str, vlan: u16) -> InterfaceRecord {
        InterfaceRecord {
            status: Some("connected".into()),
            mode: Some("access".into()),
            untagged_vlan: Some(vlan.to_string()),
            ..named(name)
        }
    }

    /// 802.1Q trunk carrying `vlans` (range notation)
    pub fn trunk_port(name: &str, native: u16, vlans: &str) -> InterfaceRecord {
        InterfaceRecord {
            status: Some("connected".into()),
            mode: Some("trunk".into()),
            untagged_vlan: Some(native.to_string()),
            tagged_vlans: Some(vlans.into()),
            ..named(name)
        }
    }

    /// Routed port with an address
    pub fn routed_port(name: &str, address: &str) -> InterfaceRecord {
        InterfaceRecord {
            status: Some("connected".into()),
            mode: Some("routed".into()),
            ip_addresses: vec![address.into()],
            ..named(name)
        }
    }

    /// Port-channel
    pub fn lag(name: &str) -> InterfaceRecord {
        InterfaceRecord {
            status: Some("connected".into()),
            ..named(name)
        }
    }

    /// Member of `lag`
    pub fn lag_member(name: &str, lag: &str) -> InterfaceRecord {
        InterfaceRecord {
            status: Some("connected".into()),
            lag: Some(lag.into()),
            ..named(name)
        }
    }

    /// Port with only a description
    pub fn described(name: &str, description: &str) -> InterfaceRecord {
        InterfaceRecord {
            description: Some(description.into()),
            ..named(name)
        }
    }

    /// Same port with a hardware address
    pub fn with_mac(mut interface: InterfaceRecord, mac: &str) -> InterfaceRecord {
        interface.mac = Some(mac.into());
        interface
    }
}

/// Common neighbor fixtures
pub mod neighbor_fixtures {
    use super::*;

    /// Neighbor that advertised its hostname
    pub fn by_hostname(local_port: &str, peer: &str, remote_port: &str) -> NeighborRecord {
        NeighborRecord {
            local_port: local_port.into(),
            remote_port: remote_port.into(),
            identity: NeighborIdentity::new(IdentityType::Hostname, peer),
            fallback: None,
        }
    }

    /// Neighbor whose hostname is unknown to the directory but whose
    /// chassis address is
    pub fn with_mac_fallback(
        local_port: &str,
        hostname: &str,
        mac: &str,
        remote_port: &str,
    ) -> NeighborRecord {
        NeighborRecord {
            fallback: Some(NeighborIdentity::new(IdentityType::Mac, mac)),
            ..by_hostname(local_port, hostname, remote_port)
        }
    }
}

/// Common inventory fixtures
pub mod inventory_fixtures {
    use super::*;

    pub fn module(name: &str, part_id: &str, serial: &str) -> InventoryRecord {
        InventoryRecord {
            name: name.into(),
            part_id: Some(part_id.into()),
            serial: Some(serial.into()),
            manufacturer: Some("Cisco".into()),
            ..Default::default()
        }
    }

    /// A module the collector could not read a serial from
    pub fn unserialized(name: &str) -> InventoryRecord {
        InventoryRecord {
            name: name.into(),
            description: Some("no serial".into()),
            ..Default::default()
        }
    }
}

/// Test scenario builder for multi-device tests
#[derive(Debug, Default)]
pub struct TestScenario {
    /// Scenario name
    pub name: String,
    /// Devices, in run order
    pub snapshots: Vec<DeviceSnapshot>,
    /// Expected record count per entity after the run
    pub expected_counts: HashMap<EntityKind, usize>,
}

impl TestScenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_device(mut self, snapshot: DeviceSnapshot) -> Self {
        self.snapshots.push(snapshot);
        self
    }

    /// Add an expected record count
    pub fn expect_count(mut self, kind: EntityKind, count: usize) -> Self {
        self.expected_counts.insert(kind, count);
        self
    }
}
