//! VLANs of a device's site.
//!
//! VLANs come from two places: explicit collector records, and switched
//! virtual interfaces (`Vlan10`) whose suffix is the tag. Explicit records
//! win. A VLAN with no name anywhere gets a generated one (`VLAN0010`),
//! which is used on create but never pushed over an existing name.

use nbsync_core::{
    compare, CompareOptions, CreateOp, CreateTarget, EntityKind, Payload, RemoteRecord,
    SkipReason, SyncStats, UpdateOp, UpdateTarget,
};
use nbsync_types::VlanId;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::orchestrator::{site_of, SyncOrch};
use crate::planned::{PayloadSource, PlannedRecord};
use crate::records::{DeviceRecord, InterfaceRecord, VlanRecord};

pub const VLAN_FIELDS: &[&str] = &["name", "status"];

/// A VLAN the device knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesiredVlan {
    pub vid: u16,
    pub name: String,
    /// The name was generated rather than collected.
    pub generated: bool,
    pub status: Option<String>,
}

/// Name given to a VLAN nobody named.
pub fn generated_name(vid: u16) -> String {
    format!("VLAN{:04}", vid)
}

/// Merges VLANs from interface names and explicit records, ordered by tag.
pub fn derive_vlans(interfaces: &[InterfaceRecord], explicit: &[VlanRecord]) -> Vec<DesiredVlan> {
    let mut vlans: BTreeMap<u16, DesiredVlan> = BTreeMap::new();

    for iface in interfaces {
        let Some(vid) = VlanId::from_interface_name(iface.name.trim()) else {
            continue;
        };
        let vid = vid.as_u16();
        let description = iface
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        vlans.insert(
            vid,
            DesiredVlan {
                vid,
                name: description.map_or_else(|| generated_name(vid), str::to_string),
                generated: description.is_none(),
                status: None,
            },
        );
    }

    for record in explicit {
        if VlanId::new(record.vid).is_err() {
            debug!(vid = record.vid, "ignoring out-of-range VLAN");
            continue;
        }
        let vid = record.vid;
        let named = record.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let entry = vlans.entry(vid).or_insert_with(|| DesiredVlan {
            vid,
            name: generated_name(vid),
            generated: true,
            status: None,
        });
        if let Some(name) = named {
            entry.name = name.to_string();
            entry.generated = false;
        }
        if let Some(status) = record.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            entry.status = Some(status.to_ascii_lowercase());
        }
    }

    vlans.into_values().collect()
}

fn remote_key(remote: &RemoteRecord) -> Option<String> {
    remote.int("vid").map(|v| v.to_string())
}

/// Reconciles the VLANs a device reports against its site's VLANs.
///
/// Site VLANs are shared by every device of the site, so VLANs missing from
/// one device are never deleted. Created VLANs go into the run cache, where
/// interface sync finds them.
#[instrument(skip_all, fields(run = %orch.ctx().short_id(), device = %device.name))]
pub async fn sync_vlans(
    orch: &mut SyncOrch,
    device: &DeviceRecord,
    interfaces: &[InterfaceRecord],
    explicit: &[VlanRecord],
) -> SyncStats {
    let mut stats = SyncStats::new("vlans");
    let options = orch.config.vlans.options.clone();
    if !options.enabled {
        debug!("vlan sync disabled");
        return stats;
    }
    let desired = derive_vlans(interfaces, explicit);
    if desired.is_empty() {
        return stats;
    }
    let directory = Arc::clone(&orch.directory);
    let dir = directory.as_ref();

    let Some(remote_device) = orch.resolve_device(device).await else {
        warn!("device not found in directory, skipping VLANs");
        stats.record_skip(&device.name, &SkipReason::Unresolved("device".into()));
        return stats;
    };
    let site = site_of(&remote_device);

    orch.cache.warm_vlans(dir, site).await;
    let Some(remote) = orch
        .cache
        .site_vlans(site)
        .map(|vlans| vlans.values().cloned().collect::<Vec<_>>())
    else {
        stats.record_skip(&device.name, &SkipReason::Unresolved("site VLANs".into()));
        return stats;
    };

    let mut generated: BTreeMap<String, String> = BTreeMap::new();
    let locals: Vec<PlannedRecord> = desired
        .iter()
        .map(|vlan| {
            let key = vlan.vid.to_string();
            let mut attrs = Payload::new();
            attrs.insert("vid".into(), Value::from(vlan.vid));
            if vlan.generated {
                generated.insert(key.clone(), vlan.name.clone());
            } else {
                attrs.insert("name".into(), Value::from(vlan.name.as_str()));
            }
            if let Some(status) = vlan
                .status
                .as_deref()
                .or_else(|| options.default_value("status"))
            {
                attrs.insert("status".into(), Value::from(status));
            }
            if let Some(site) = site {
                attrs.insert("site".into(), Value::from(site));
            }
            PlannedRecord::new(key, attrs)
        })
        .collect();

    let source = PayloadSource::new(&["site"], remote_key);
    let compare_options = CompareOptions::new(EntityKind::Vlan)
        .fields(options.enabled_fields(VLAN_FIELDS))
        .cleanup(false);
    let diff = compare(locals, remote, &source, &compare_options);
    info!(summary = %diff.summary(), "VLANs compared");

    for item in &diff.to_skip {
        if let Some(reason) = &item.skip_reason {
            stats.record_skip(&item.key, reason);
        }
    }

    let mut creates = Vec::new();
    for item in &diff.to_create {
        let Some(local) = &item.local else { continue };
        if !options.create_missing {
            stats.record_skip(&item.key, &SkipReason::NotActionable("create disabled".into()));
            continue;
        }
        let mut payload = local.attrs.clone();
        if let Some(name) = generated.get(&item.key) {
            payload.insert("name".into(), Value::from(name.as_str()));
        }
        creates.push(CreateOp {
            key: item.key.clone(),
            payload,
        });
    }
    let created = orch
        .executor
        .execute(dir, &CreateTarget(EntityKind::Vlan), &creates, &mut stats)
        .await;
    for vlan in created.into_iter().flatten() {
        orch.cache.remember_vlan(site, vlan);
    }

    let mut updates = Vec::new();
    let mut merged = Vec::new();
    for item in &diff.to_update {
        let (Some(local), Some(current)) = (&item.local, &item.remote) else {
            continue;
        };
        if !options.update_existing {
            stats.record_skip(&item.key, &SkipReason::NotActionable("update disabled".into()));
            continue;
        }
        let changes = local.changes(&item.changes);
        let mut record = current.clone();
        record.merge(&changes);
        merged.push(record);
        updates.push(UpdateOp {
            key: item.key.clone(),
            id: current.id(),
            changes,
            notes: item.changes.iter().map(ToString::to_string).collect(),
        });
    }
    let updated = orch
        .executor
        .execute(dir, &UpdateTarget(EntityKind::Vlan), &updates, &mut stats)
        .await;
    for (record, result) in merged.into_iter().zip(updated) {
        if result.is_some() {
            orch.cache.remember_vlan(site, record);
        }
    }

    stats
}
