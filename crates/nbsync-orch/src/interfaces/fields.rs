//! Desired interface state and the field source used to compare it.

use nbsync_core::{FieldSource, FieldValue, LocalRecord, RecordId, RemoteRecord};
use nbsync_types::iface::{canonical_name, interface_type, is_lag_name, parse_speed_kbps};
use nbsync_types::{Duplex, EnabledMode, MacAddress, SwitchportMode, VlanId, VlanSet};
use serde_json::Value;
use std::collections::HashMap;

use crate::records::InterfaceRecord;

pub const TYPE: &str = "type";
pub const DESCRIPTION: &str = "description";
pub const ENABLED: &str = "enabled";
pub const MAC: &str = "mac_address";
pub const MTU: &str = "mtu";
pub const SPEED: &str = "speed";
pub const DUPLEX: &str = "duplex";
pub const MODE: &str = "mode";
pub const UNTAGGED_VLAN: &str = "untagged_vlan";
pub const TAGGED_VLANS: &str = "tagged_vlans";
pub const LAG: &str = "lag";

/// Fields compared by default. The hardware address is not among them: it
/// has its own assignment pass.
pub const BASE_FIELDS: &[&str] = &[DESCRIPTION, ENABLED, MODE, MTU, DUPLEX, SPEED, LAG];

/// An interface reduced to directory values.
///
/// Every attribute is optional: `None` means the collector gave nothing
/// usable and the field is neither compared nor written.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredInterface {
    pub name: String,
    pub kind: &'static str,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub mtu: Option<i64>,
    pub speed: Option<u64>,
    pub duplex: Option<Duplex>,
    pub mode: Option<SwitchportMode>,
    pub untagged_vlan: Option<u16>,
    pub tagged_vlans: Option<VlanSet>,
    pub lag: Option<String>,
    pub mac: Option<MacAddress>,
    pub has_ip: bool,
}

impl DesiredInterface {
    /// Derives directory values from a collected interface.
    pub fn derive(record: &InterfaceRecord, enabled_mode: EnabledMode) -> Self {
        let speed = record.speed.as_deref().and_then(parse_speed_kbps);
        let tagged = record
            .tagged_vlans
            .as_deref()
            .and_then(|s| VlanSet::from_range_str(s).ok());
        let mode = record
            .mode
            .as_deref()
            .and_then(|m| SwitchportMode::from_device(m, tagged.as_ref()));

        Self {
            name: record.name.trim().to_string(),
            kind: interface_type(&record.name, record.hardware.as_deref(), speed),
            description: record.description.as_ref().map(|d| d.trim().to_string()),
            enabled: record
                .status
                .as_deref()
                .map(|s| enabled_mode.is_enabled(s)),
            mtu: record
                .mtu
                .as_deref()
                .and_then(|m| m.trim().parse::<i64>().ok())
                .filter(|m| *m > 0),
            speed,
            duplex: record.duplex.as_deref().and_then(Duplex::parse),
            mode,
            untagged_vlan: record
                .untagged_vlan
                .as_deref()
                .and_then(|v| v.parse::<VlanId>().ok())
                .map(|v| v.as_u16()),
            tagged_vlans: tagged,
            lag: record
                .lag
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(canonical_name),
            mac: record
                .mac
                .as_deref()
                .and_then(|m| m.parse::<MacAddress>().ok())
                .filter(MacAddress::is_assignable),
            has_ip: !record.ip_addresses.is_empty(),
        }
    }

    pub fn is_lag(&self) -> bool {
        is_lag_name(&self.name)
    }

    /// Desired untagged VLAN: a tag, `Null` for routed ports, or absent.
    pub fn untagged_value(&self) -> Option<FieldValue> {
        match (self.untagged_vlan, self.mode) {
            (_, Some(SwitchportMode::Routed)) => Some(FieldValue::Null),
            (Some(tag), _) => Some(FieldValue::Int(i64::from(tag))),
            _ => None,
        }
    }

    /// Desired tagged VLAN set. Only explicit trunks carry tags; every other
    /// known mode clears them.
    pub fn tagged_value(&self) -> Option<FieldValue> {
        match self.mode {
            Some(SwitchportMode::Tagged) => self.tagged_vlans.clone().map(FieldValue::Vlans),
            Some(_) => Some(FieldValue::Vlans(VlanSet::new())),
            None => self.tagged_vlans.clone().map(FieldValue::Vlans),
        }
    }
}

impl LocalRecord for DesiredInterface {
    fn key(&self) -> String {
        self.name.clone()
    }
}

/// Reads interface fields from desired state and from directory records.
///
/// VLAN references are translated through `vlan_tags`, which the caller
/// fills before comparing; a reference missing from it reads as absent.
pub struct InterfaceFieldSource<'a> {
    vlan_tags: &'a HashMap<RecordId, u16>,
    lag_names: HashMap<RecordId, String>,
    /// Canonical name → local spelling, so `GigabitEthernet0/1` in the
    /// directory pairs with a collected `Gi0/1`.
    aliases: HashMap<String, String>,
}

impl<'a> InterfaceFieldSource<'a> {
    pub fn new(
        vlan_tags: &'a HashMap<RecordId, u16>,
        remote: &[RemoteRecord],
        local: &[DesiredInterface],
    ) -> Self {
        let lag_names = remote
            .iter()
            .filter_map(|r| r.name().map(|n| (r.id(), canonical_name(n))))
            .collect();
        let aliases = local
            .iter()
            .map(|l| (canonical_name(&l.name), l.name.clone()))
            .collect();
        Self {
            vlan_tags,
            lag_names,
            aliases,
        }
    }
}

/// Reads a choice field stored either as a bare value or as
/// `{"value": ..., "label": ...}`.
pub(crate) fn choice(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null => Some(FieldValue::Null),
        Value::String(s) => Some(FieldValue::text(s.as_str())),
        Value::Object(map) => map.get("value").and_then(choice),
        _ => None,
    }
}

impl FieldSource<DesiredInterface> for InterfaceFieldSource<'_> {
    fn remote_key(&self, remote: &RemoteRecord) -> Option<String> {
        let name = remote.name()?;
        Some(
            self.aliases
                .get(&canonical_name(name))
                .cloned()
                .unwrap_or_else(|| name.to_string()),
        )
    }

    fn local_value(&self, local: &DesiredInterface, field: &str) -> Option<FieldValue> {
        match field {
            TYPE => Some(FieldValue::text(local.kind)),
            DESCRIPTION => local.description.clone().map(FieldValue::Text),
            ENABLED => local.enabled.map(FieldValue::Bool),
            MTU => local.mtu.map(FieldValue::Int),
            SPEED => local.speed.map(|s| FieldValue::Int(s as i64)),
            DUPLEX => local.duplex.map(|d| FieldValue::text(d.as_str())),
            MODE => local
                .mode
                .map(|m| FieldValue::opt_text(m.directory_value())),
            UNTAGGED_VLAN => local.untagged_value(),
            TAGGED_VLANS => local.tagged_value(),
            LAG => Some(FieldValue::opt_text(local.lag.clone())),
            MAC => local.mac.map(|m| FieldValue::Text(m.to_string())),
            _ => None,
        }
    }

    fn remote_value(&self, remote: &RemoteRecord, field: &str) -> Option<FieldValue> {
        match field {
            TYPE | DUPLEX => remote.get(field).and_then(choice),
            MODE => {
                let raw = remote.get(field).and_then(choice)?;
                // An empty mode is a routed port; unknown values compare as-is.
                Some(match SwitchportMode::from_directory(raw.as_text()) {
                    Some(mode) => FieldValue::opt_text(mode.directory_value()),
                    None => raw,
                })
            }
            DESCRIPTION => match remote.get(field) {
                Some(Value::String(s)) => Some(FieldValue::text(s.as_str())),
                Some(Value::Null) => Some(FieldValue::text("")),
                _ => None,
            },
            ENABLED => remote.bool(field).map(FieldValue::Bool),
            MTU | SPEED => match remote.get(field)? {
                Value::Null => Some(FieldValue::Null),
                v => v.as_i64().map(FieldValue::Int),
            },
            UNTAGGED_VLAN => match remote.get(field) {
                None | Some(Value::Null) => Some(FieldValue::Null),
                Some(_) => remote
                    .ref_id(field)
                    .and_then(|id| self.vlan_tags.get(&id))
                    .map(|tag| FieldValue::Int(i64::from(*tag))),
            },
            TAGGED_VLANS => {
                let mut tags = VlanSet::new();
                for id in remote.ref_ids(field) {
                    tags.insert(*self.vlan_tags.get(&id)?);
                }
                Some(FieldValue::Vlans(tags))
            }
            LAG => match remote.get(field) {
                None | Some(Value::Null) => Some(FieldValue::Null),
                Some(_) => remote
                    .ref_id(field)
                    .and_then(|id| self.lag_names.get(&id))
                    .map(|n| FieldValue::text(n.as_str())),
            },
            MAC => remote
                .str(field)
                .and_then(|m| m.parse::<MacAddress>().ok())
                .map(|m| FieldValue::Text(m.to_string()))
                .or(Some(FieldValue::Null)),
            _ => None,
        }
    }
}
