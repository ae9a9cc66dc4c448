//! Inventory items (modules, optics, power supplies) of one device.

use nbsync_core::{
    compare, CompareOptions, CreateOp, CreateTarget, DeleteOp, DeleteTarget, EntityKind, Payload,
    Query, RemoteRecord, SkipReason, SyncStats, UpdateOp, UpdateTarget,
};
use nbsync_types::INVENTORY_NAME_MAX;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::orchestrator::SyncOrch;
use crate::planned::{PayloadSource, PlannedRecord};
use crate::records::{DeviceRecord, InventoryRecord};

pub const INVENTORY_FIELDS: &[&str] = &["serial", "part_id", "description"];

const INVENTORY_REFS: &[&str] = &["device", "manufacturer"];

/// Marker appended to a truncated name.
pub const TRUNCATION_MARKER: &str = "...";

/// Shortens a name to the directory's limit, marking the cut.
///
/// ```
/// use nbsync_orch::inventory::truncate_name;
///
/// assert_eq!(truncate_name("PSU 1"), "PSU 1");
/// let long = "x".repeat(80);
/// let short = truncate_name(&long);
/// assert_eq!(short.chars().count(), 64);
/// assert!(short.ends_with("..."));
/// ```
pub fn truncate_name(name: &str) -> String {
    let name = name.trim();
    if name.chars().count() <= INVENTORY_NAME_MAX {
        return name.to_string();
    }
    let keep = INVENTORY_NAME_MAX - TRUNCATION_MARKER.len();
    let mut truncated: String = name.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

fn remote_key(remote: &RemoteRecord) -> Option<String> {
    remote.name().map(str::to_string)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Reconciles the inventory items of one device.
///
/// Items without a serial number cannot be told apart from their
/// replacements, so they are never written; they still count as present and
/// protect a matching directory item from cleanup.
#[instrument(skip_all, fields(run = %orch.ctx().short_id(), device = %device.name))]
pub async fn sync_inventory(
    orch: &mut SyncOrch,
    device: &DeviceRecord,
    items: &[InventoryRecord],
) -> SyncStats {
    let mut stats = SyncStats::new("inventory");
    let options = orch.config.inventory.options.clone();
    if !options.enabled {
        debug!("inventory sync disabled");
        return stats;
    }
    let directory = Arc::clone(&orch.directory);
    let dir = directory.as_ref();

    let Some(remote_device) = orch.resolve_device(device).await else {
        warn!("device not found in directory, skipping inventory");
        stats.record_skip(&device.name, &SkipReason::Unresolved("device".into()));
        return stats;
    };
    let device_id = remote_device.id();

    let remote = match dir
        .filter(EntityKind::InventoryItem, &Query::new().eq("device", device_id))
        .await
    {
        Ok(remote) => remote,
        Err(e) => {
            warn!(error = %e, "inventory fetch failed, skipping inventory");
            stats.record_skip(&device.name, &SkipReason::Unresolved("existing inventory".into()));
            return stats;
        }
    };

    let mut locals = Vec::with_capacity(items.len());
    for item in items {
        if item.name.trim().is_empty() {
            continue;
        }
        let name = truncate_name(&item.name);
        if name != item.name.trim() {
            debug!(original = %item.name, truncated = %name, "inventory name truncated");
        }
        let mut attrs = Payload::new();
        attrs.insert("device".into(), Value::from(device_id));
        attrs.insert("name".into(), Value::from(name.as_str()));
        for (field, value) in [
            ("serial", &item.serial),
            ("part_id", &item.part_id),
            ("description", &item.description),
        ] {
            if let Some(value) = non_empty(value) {
                attrs.insert(field.into(), Value::from(value));
            }
        }
        if let Some(manufacturer) = non_empty(&item.manufacturer) {
            if let Some(found) = orch
                .resolver
                .resolve_or_create(dir, &mut orch.cache, EntityKind::Manufacturer, manufacturer, Payload::new())
                .await
            {
                attrs.insert("manufacturer".into(), Value::from(found.id()));
            }
        }
        locals.push(PlannedRecord::new(name, attrs));
    }

    let source = PayloadSource::new(INVENTORY_REFS, remote_key);
    let compare_options = CompareOptions::new(EntityKind::InventoryItem)
        .fields(options.enabled_fields(INVENTORY_FIELDS))
        .cleanup(orch.config.cleanup_for(&options));
    let diff = compare(locals, remote, &source, &compare_options);
    info!(summary = %diff.summary(), "inventory compared");

    for item in &diff.to_skip {
        if let Some(reason) = &item.skip_reason {
            stats.record_skip(&item.key, reason);
        }
    }

    let no_serial = SkipReason::NotActionable("no serial".into());

    let mut creates = Vec::new();
    for item in &diff.to_create {
        let Some(local) = &item.local else { continue };
        if local.get("serial").is_none() {
            stats.record_skip(&item.key, &no_serial);
        } else if !options.create_missing {
            stats.record_skip(&item.key, &SkipReason::NotActionable("create disabled".into()));
        } else {
            creates.push(CreateOp {
                key: item.key.clone(),
                payload: local.attrs.clone(),
            });
        }
    }

    let mut updates = Vec::new();
    for item in &diff.to_update {
        let (Some(local), Some(current)) = (&item.local, &item.remote) else {
            continue;
        };
        if local.get("serial").is_none() {
            stats.record_skip(&item.key, &no_serial);
        } else if !options.update_existing {
            stats.record_skip(&item.key, &SkipReason::NotActionable("update disabled".into()));
        } else {
            updates.push(UpdateOp {
                key: item.key.clone(),
                id: current.id(),
                changes: local.changes(&item.changes),
                notes: item.changes.iter().map(ToString::to_string).collect(),
            });
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

    let executor = orch.executor;
    executor
        .execute(dir, &CreateTarget(EntityKind::InventoryItem), &creates, &mut stats)
        .await;
    executor
        .execute(dir, &UpdateTarget(EntityKind::InventoryItem), &updates, &mut stats)
        .await;
    executor
        .execute(dir, &DeleteTarget(EntityKind::InventoryItem), &deletes, &mut stats)
        .await;

    stats
}
