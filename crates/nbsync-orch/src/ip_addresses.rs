//! IP addresses assigned to a device's interfaces.
//!
//! Addresses are keyed by the bare address. A changed prefix length cannot
//! be written as an update, so the record is replaced: deleted, then created
//! again with the new prefix.

use nbsync_core::{
    compare, CompareOptions, CreateOp, CreateTarget, DeleteOp, DeleteTarget, EntityKind, Payload,
    Query, RecordId, RemoteRecord, SkipReason, SyncStats, UpdateOp, UpdateTarget,
};
use nbsync_types::IpInterface;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::orchestrator::SyncOrch;
use crate::planned::{PayloadSource, PlannedRecord};
use crate::records::{DeviceRecord, IpRecord};

pub const IP_FIELDS: &[&str] = &["address", "interface", "status", "dns_name"];

const IP_REFS: &[&str] = &["interface", "device"];

const DEFAULT_STATUS: &str = "active";

/// Bare-address key of a directory IP record.
fn remote_key(remote: &RemoteRecord) -> Option<String> {
    remote
        .str("address")
        .and_then(|a| a.parse::<IpInterface>().ok())
        .map(|ip| ip.bare())
}

/// Reconciles the IP addresses of one device.
///
/// Existing addresses are fetched with one filter on the owning device.
/// Owning interfaces are resolved through the run cache; an address whose
/// interface is unknown is not created.
#[instrument(skip_all, fields(run = %orch.ctx().short_id(), device = %device.name))]
pub async fn sync_ip_addresses(
    orch: &mut SyncOrch,
    device: &DeviceRecord,
    addresses: &[IpRecord],
) -> SyncStats {
    let mut stats = SyncStats::new("ip_addresses");
    let config = orch.config.ip_addresses.clone();
    if !config.options.enabled {
        debug!("ip address sync disabled");
        return stats;
    }
    let directory = Arc::clone(&orch.directory);
    let dir = directory.as_ref();

    let Some(remote_device) = orch.resolve_device(device).await else {
        warn!("device not found in directory, skipping addresses");
        stats.record_skip(&device.name, &SkipReason::Unresolved("device".into()));
        return stats;
    };
    let device_id = remote_device.id();

    let remote = match dir
        .filter(EntityKind::IpAddress, &Query::new().eq("device", device_id))
        .await
    {
        Ok(remote) => remote,
        Err(e) => {
            warn!(error = %e, "address fetch failed, skipping addresses");
            stats.record_skip(&device.name, &SkipReason::Unresolved("existing addresses".into()));
            return stats;
        }
    };

    let mut locals = Vec::with_capacity(addresses.len());
    let mut interface_names: HashMap<String, String> = HashMap::new();
    let mut primaries: Vec<IpInterface> = Vec::new();
    for record in addresses {
        let Ok(ip) = record.address.parse::<IpInterface>() else {
            debug!(address = %record.address, "unparsable address");
            stats.record_skip(
                record.address.trim(),
                &SkipReason::NotActionable("invalid address".into()),
            );
            continue;
        };
        let mut attrs = Payload::new();
        attrs.insert("address".into(), Value::from(ip.to_string()));
        attrs.insert("device".into(), Value::from(device_id));
        if let Some(iface) = orch
            .cache
            .find_interface(dir, device_id, &record.interface)
            .await
        {
            attrs.insert("interface".into(), Value::from(iface.id()));
        }
        let status = record
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| config.options.default_value("status"))
            .unwrap_or(DEFAULT_STATUS);
        attrs.insert("status".into(), Value::from(status.to_ascii_lowercase()));
        if let Some(dns) = record.dns_name.as_deref().map(str::trim) {
            attrs.insert("dns_name".into(), Value::from(dns));
        }
        if record.primary {
            primaries.push(ip);
        }
        interface_names.insert(ip.bare(), record.interface.clone());
        locals.push(PlannedRecord::new(ip.bare(), attrs));
    }

    let source = PayloadSource::new(IP_REFS, remote_key);
    let options = CompareOptions::new(EntityKind::IpAddress)
        .fields(config.options.enabled_fields(IP_FIELDS))
        .cleanup(orch.config.cleanup_for(&config.options));
    let diff = compare(locals, remote, &source, &options);
    info!(summary = %diff.summary(), "addresses compared");

    for item in &diff.to_skip {
        if let Some(reason) = &item.skip_reason {
            stats.record_skip(&item.key, reason);
        }
    }

    // Record ids by bare address, for the primary flag.
    let mut ids: HashMap<String, RecordId> = diff
        .iter()
        .filter(|item| item.local.is_some())
        .filter_map(|item| item.remote_id().map(|id| (item.key.clone(), id)))
        .collect();

    let mut creates = Vec::new();
    let mut replaced = Vec::new();
    let mut updates = Vec::new();

    for item in &diff.to_create {
        let Some(local) = &item.local else { continue };
        if !config.options.create_missing {
            stats.record_skip(&item.key, &SkipReason::NotActionable("create disabled".into()));
            continue;
        }
        if local.get("interface").is_none() {
            let name = interface_names.get(&item.key).map(String::as_str).unwrap_or("?");
            stats.record_skip(&item.key, &SkipReason::Unresolved(format!("interface {}", name)));
            continue;
        }
        creates.push(CreateOp {
            key: item.key.clone(),
            payload: local.attrs.clone(),
        });
    }

    for item in &diff.to_update {
        let (Some(local), Some(current)) = (&item.local, &item.remote) else {
            continue;
        };
        if !config.options.update_existing {
            stats.record_skip(&item.key, &SkipReason::NotActionable("update disabled".into()));
            continue;
        }
        if item.changed("address") {
            debug!(address = %item.key, "prefix length changed, replacing");
            let mut payload = local.attrs.clone();
            if !payload.contains_key("interface") {
                if let Some(iface) = current.ref_id("interface") {
                    payload.insert("interface".into(), Value::from(iface));
                }
            }
            replaced.push(DeleteOp {
                key: item.key.clone(),
                id: current.id(),
            });
            creates.push(CreateOp {
                key: item.key.clone(),
                payload,
            });
            continue;
        }
        updates.push(UpdateOp {
            key: item.key.clone(),
            id: current.id(),
            changes: local.changes(&item.changes),
            notes: item.changes.iter().map(ToString::to_string).collect(),
        });
    }

    orch.executor
        .execute(dir, &UpdateTarget(EntityKind::IpAddress), &updates, &mut stats)
        .await;
    let removed = orch
        .executor
        .execute(dir, &DeleteTarget(EntityKind::IpAddress), &replaced, &mut stats)
        .await;
    for (op, result) in replaced.iter().zip(removed) {
        if result.is_none() {
            // The old record is still there; creating the new one would duplicate it.
            creates.retain(|c| c.key != op.key);
        } else {
            ids.remove(&op.key);
        }
    }
    let created = orch
        .executor
        .execute(dir, &CreateTarget(EntityKind::IpAddress), &creates, &mut stats)
        .await;
    for (op, record) in creates.iter().zip(created) {
        if let Some(record) = record {
            ids.insert(op.key.clone(), record.id());
        }
    }

    let deletes: Vec<DeleteOp> = diff
        .to_delete
        .iter()
        .filter_map(|item| {
            item.remote_id().map(|id| DeleteOp {
                key: item.key.clone(),
                id,
            })
        })
        .collect();
    orch.executor
        .execute(dir, &DeleteTarget(EntityKind::IpAddress), &deletes, &mut stats)
        .await;

    if config.set_primary && !primaries.is_empty() {
        set_primary(orch, &remote_device, &primaries, &ids, &mut stats).await;
    }

    stats
}

/// Points the device's `primary_ip4`/`primary_ip6` at flagged addresses.
async fn set_primary(
    orch: &mut SyncOrch,
    device: &RemoteRecord,
    primaries: &[IpInterface],
    ids: &HashMap<String, RecordId>,
    stats: &mut SyncStats,
) {
    let mut changes = Payload::new();
    let mut notes = Vec::new();
    for ip in primaries {
        let field = if ip.is_ipv4() { "primary_ip4" } else { "primary_ip6" };
        let Some(id) = ids.get(&ip.bare()) else {
            debug!(address = %ip, "primary address was not written, leaving device unchanged");
            continue;
        };
        if device.ref_id(field) == Some(*id) {
            continue;
        }
        changes.insert(field.into(), Value::from(*id));
        notes.push(format!("{}: {}", field, ip));
    }
    if changes.is_empty() {
        return;
    }

    let key = device.name().unwrap_or_default().to_string();
    let op = UpdateOp {
        key,
        id: device.id(),
        changes: changes.clone(),
        notes,
    };
    let directory = Arc::clone(&orch.directory);
    let result = orch
        .executor
        .execute(directory.as_ref(), &UpdateTarget(EntityKind::Device), &[op], stats)
        .await;
    if result.into_iter().flatten().next().is_some() {
        let mut merged = device.clone();
        merged.merge(&changes);
        orch.cache.remember_device(merged);
    }
}
