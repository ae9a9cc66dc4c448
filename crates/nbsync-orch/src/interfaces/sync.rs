//! The interface sequence for one device.

use nbsync_core::{
    compare, CompareOptions, CreateOp, CreateTarget, DeleteOp, DeleteTarget, DirectoryCache,
    EntityKind, ExcludeSet, MacOp, MacTarget, Payload, RecordId, RemoteRecord, SkipReason,
    SyncStats, UpdateOp, UpdateTarget,
};
use nbsync_types::iface::is_lag_name;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::checks::{self, CheckContext, CheckOutcome};
use super::fields::{
    DesiredInterface, InterfaceFieldSource, BASE_FIELDS, MAC, TAGGED_VLANS, TYPE, UNTAGGED_VLAN,
};
use crate::config::MacPolicy;
use crate::orchestrator::{site_of, SyncOrch};
use crate::records::{DeviceRecord, InterfaceRecord};

/// Type written on create when type detection is off and no default is
/// configured.
const FALLBACK_TYPE: &str = "other";

/// Reconciles the interfaces of one device.
///
/// LAG interfaces are created before members so member payloads can carry the
/// parent's id, and deleted after them. Hardware addresses are assigned in a
/// separate batch once the interface writes are done.
#[instrument(skip_all, fields(run = %orch.ctx().short_id(), device = %device.name))]
pub async fn sync_interfaces(
    orch: &mut SyncOrch,
    device: &DeviceRecord,
    interfaces: &[InterfaceRecord],
) -> SyncStats {
    let mut stats = SyncStats::new("interfaces");
    let config = orch.config.interfaces.clone();
    if !config.options.enabled {
        debug!("interface sync disabled");
        return stats;
    }
    let directory = Arc::clone(&orch.directory);
    let dir = directory.as_ref();

    let Some(remote_device) = orch.resolve_device(device).await else {
        warn!("device not found in directory, skipping interfaces");
        stats.record_skip(&device.name, &SkipReason::Unresolved("device".into()));
        return stats;
    };
    let device_id = remote_device.id();
    let site = site_of(&remote_device);

    if config.sync_vlans {
        orch.cache.warm_vlans(dir, site).await;
        if site.is_some() {
            orch.cache.warm_vlans(dir, None).await;
        }
    }

    let remote = orch.cache.device_interfaces(dir, device_id).await;
    let vlan_refs: Vec<Value> = remote.iter().flat_map(vlan_refs_of).collect();
    orch.cache.resolve_vlan_tags(dir, vlan_refs.iter()).await;

    let mut desired: Vec<DesiredInterface> = interfaces
        .iter()
        .map(|i| DesiredInterface::derive(i, config.enabled_mode))
        .collect();
    desired.sort_by_key(|d| !d.is_lag());

    let mut candidates: Vec<&str> = BASE_FIELDS.to_vec();
    if config.auto_type {
        candidates.push(TYPE);
    }
    if config.sync_vlans {
        candidates.extend([UNTAGGED_VLAN, TAGGED_VLANS]);
    }
    let fields = config.options.enabled_fields(&candidates);
    let excludes = config.excludes().unwrap_or_else(|e| {
        warn!(error = %e, "ignoring invalid exclude patterns");
        ExcludeSet::default()
    });
    let options = CompareOptions::new(EntityKind::Interface)
        .fields(fields.iter().cloned())
        .excludes(excludes)
        .cleanup(orch.config.cleanup_for(&config.options));

    let vlan_tags = orch.cache.vlan_tags().clone();
    let source = InterfaceFieldSource::new(&vlan_tags, &remote, &desired);
    let diff = compare(desired.clone(), remote, &source, &options);
    info!(summary = %diff.summary(), "interfaces compared");

    let vlan_ids = vlan_ids(&orch.cache, site);
    let mac_policy = if config.options.field_enabled(MAC) {
        config.mac_policy
    } else {
        MacPolicy::Never
    };
    let mut mac_ops: Vec<MacOp> = Vec::new();

    // ============ Skips ============

    for item in &diff.to_skip {
        if let Some(reason) = &item.skip_reason {
            stats.record_skip(&item.key, reason);
        }
    }

    // ============ Creates ============

    if !config.options.create_missing {
        for item in &diff.to_create {
            stats.record_skip(&item.key, &SkipReason::NotActionable("create disabled".into()));
        }
    } else {
        let (lags, members): (Vec<_>, Vec<_>) = diff
            .to_create
            .iter()
            .filter_map(|item| item.local.as_ref())
            .partition(|d| d.is_lag());

        for phase in [lags, members] {
            if phase.is_empty() {
                continue;
            }
            let lag_ids = lag_ids(&orch.cache, device_id, &desired);
            let ctx = CheckContext {
                source: &source,
                fields: &fields,
                vlan_ids: &vlan_ids,
                lag_ids: &lag_ids,
                mac_policy,
            };
            let empty = RemoteRecord::placeholder(Payload::new());

            let mut ops = Vec::with_capacity(phase.len());
            let mut macs = Vec::with_capacity(phase.len());
            for local in phase {
                let plan = checks::plan(&ctx, local, &empty);
                if let Some(parent) = &plan.missing_parent {
                    stats.record_skip(&local.name, &SkipReason::Unresolved(parent.clone()));
                    continue;
                }
                for note in &plan.unresolved {
                    debug!(interface = %local.name, note = %note, "creating without unresolved field");
                }
                let mut payload = plan.changes;
                payload.insert("device".into(), Value::from(device_id));
                payload.insert("name".into(), Value::from(local.name.as_str()));
                let kind = if config.auto_type {
                    local.kind
                } else {
                    config.options.default_value(TYPE).unwrap_or(FALLBACK_TYPE)
                };
                payload.insert(TYPE.into(), Value::from(kind));
                ops.push(CreateOp {
                    key: local.name.clone(),
                    payload,
                });
                macs.push(plan.mac);
            }

            let results = orch
                .executor
                .execute(dir, &CreateTarget(EntityKind::Interface), &ops, &mut stats)
                .await;
            for ((op, created), mac) in ops.iter().zip(results).zip(macs) {
                let Some(created) = created else { continue };
                if let Some(mac) = mac {
                    mac_ops.push(MacOp {
                        key: op.key.clone(),
                        interface_id: created.id(),
                        mac,
                    });
                }
                orch.cache.remember_interface(device_id, created);
            }
        }
    }

    // ============ Updates ============

    if !config.options.update_existing {
        for item in &diff.to_update {
            stats.record_skip(&item.key, &SkipReason::NotActionable("update disabled".into()));
        }
    } else if !diff.to_update.is_empty() {
        let lag_ids = lag_ids(&orch.cache, device_id, &desired);
        let ctx = CheckContext {
            source: &source,
            fields: &fields,
            vlan_ids: &vlan_ids,
            lag_ids: &lag_ids,
            mac_policy,
        };

        let mut ops = Vec::new();
        let mut pending = Vec::new();
        for item in &diff.to_update {
            let (Some(local), Some(current)) = (&item.local, &item.remote) else {
                continue;
            };
            let plan = checks::plan(&ctx, local, current);
            let mac_op = plan.mac.map(|mac| MacOp {
                key: item.key.clone(),
                interface_id: current.id(),
                mac,
            });

            if plan.changes.is_empty() {
                let reason = if plan.unresolved.is_empty() {
                    SkipReason::NoChanges
                } else {
                    SkipReason::Unresolved(plan.unresolved.join(", "))
                };
                stats.record_skip(&item.key, &reason);
                mac_ops.extend(mac_op);
                continue;
            }

            let mut notes = plan.notes;
            notes.extend(plan.unresolved.iter().map(|u| format!("skipped {}", u)));
            ops.push(UpdateOp {
                key: item.key.clone(),
                id: current.id(),
                changes: plan.changes,
                notes,
            });
            pending.push((current.name().unwrap_or(&item.key).to_string(), mac_op));
        }

        let results = orch
            .executor
            .execute(dir, &UpdateTarget(EntityKind::Interface), &ops, &mut stats)
            .await;
        for ((op, updated), (remote_name, mac_op)) in ops.iter().zip(results).zip(pending) {
            if updated.is_none() {
                continue;
            }
            orch.cache
                .apply_interface_changes(device_id, &remote_name, &op.changes);
            mac_ops.extend(mac_op);
        }
    }

    // ============ Hardware addresses ============

    // Unchanged interfaces can still be missing an address assigned once an
    // IP showed up.
    {
        let lag_ids = HashMap::new();
        let ctx = CheckContext {
            source: &source,
            fields: &fields,
            vlan_ids: &vlan_ids,
            lag_ids: &lag_ids,
            mac_policy,
        };
        for item in &diff.to_skip {
            if item.skip_reason != Some(SkipReason::NoChanges) {
                continue;
            }
            let (Some(local), Some(current)) = (&item.local, &item.remote) else {
                continue;
            };
            if let Some(CheckOutcome::Mac { mac, note }) = checks::check_mac(&ctx, local, current) {
                debug!(interface = %item.key, %note, "address missing on unchanged interface");
                mac_ops.push(MacOp {
                    key: item.key.clone(),
                    interface_id: current.id(),
                    mac,
                });
            }
        }
    }

    orch.executor
        .execute(dir, &MacTarget, &mac_ops, &mut stats)
        .await;

    // ============ Deletes ============

    let (lag_deletes, member_deletes): (Vec<DeleteOp>, Vec<DeleteOp>) = diff
        .to_delete
        .iter()
        .filter_map(|item| {
            item.remote_id().map(|id| DeleteOp {
                key: item.key.clone(),
                id,
            })
        })
        .partition(|op| is_lag_name(&op.key));

    for ops in [member_deletes, lag_deletes] {
        let results = orch
            .executor
            .execute(dir, &DeleteTarget(EntityKind::Interface), &ops, &mut stats)
            .await;
        for (op, deleted) in ops.iter().zip(results) {
            if deleted.is_some() {
                orch.cache.forget_interface(device_id, &op.key);
            }
        }
    }

    info!(summary = %stats.summary(), "interfaces synced");
    stats
}

/// VLAN references carried by a directory interface.
fn vlan_refs_of(remote: &RemoteRecord) -> Vec<Value> {
    let mut refs = Vec::new();
    if let Some(untagged) = remote.get(UNTAGGED_VLAN).filter(|v| !v.is_null()) {
        refs.push(untagged.clone());
    }
    if let Some(Value::Array(tagged)) = remote.get(TAGGED_VLANS) {
        refs.extend(tagged.iter().cloned());
    }
    refs
}

/// Tag → VLAN id usable by this device: global VLANs, overridden by the
/// device's site.
fn vlan_ids(cache: &DirectoryCache, site: Option<RecordId>) -> HashMap<u16, RecordId> {
    let mut ids = HashMap::new();
    let scopes = if site.is_some() { vec![None, site] } else { vec![None] };
    for scope in scopes {
        if let Some(vlans) = cache.site_vlans(scope) {
            ids.extend(vlans.iter().map(|(tag, vlan)| (*tag, vlan.id())));
        }
    }
    ids
}

/// Resolves every parent LAG the desired interfaces name.
fn lag_ids(
    cache: &DirectoryCache,
    device_id: RecordId,
    desired: &[DesiredInterface],
) -> HashMap<String, RecordId> {
    desired
        .iter()
        .filter_map(|d| d.lag.as_ref())
        .filter_map(|name| {
            cache
                .cached_interface(device_id, name)
                .map(|lag| (name.clone(), lag.id()))
        })
        .collect()
}
