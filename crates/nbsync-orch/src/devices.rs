//! Device records and the reference entities they point at.

use nbsync_core::{
    compare, CompareOptions, CreateOp, CreateTarget, Directory, EntityKind, Payload,
    RemoteRecord, SkipReason, SyncStats, UpdateOp, UpdateTarget,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::EntityOptions;
use crate::orchestrator::SyncOrch;
use crate::planned::{PayloadSource, PlannedRecord};
use crate::records::DeviceRecord;

/// Fields compared on an existing device.
pub const DEVICE_FIELDS: &[&str] = &[
    "serial",
    "device_type",
    "role",
    "site",
    "platform",
    "tenant",
    "status",
];

const DEVICE_REFS: &[&str] = &["device_type", "role", "site", "platform", "tenant"];

const DEFAULT_STATUS: &str = "active";

/// Creates or updates the directory record of one device.
///
/// Site, role, manufacturer and device type are resolved (or created) first;
/// a device missing any of them is skipped. Platform and tenant are optional.
/// The resulting record is remembered in the run cache for the entities
/// that follow.
#[instrument(skip_all, fields(run = %orch.ctx().short_id(), device = %device.name))]
pub async fn sync_device(orch: &mut SyncOrch, device: &DeviceRecord) -> SyncStats {
    let mut stats = SyncStats::new("devices");
    let options = orch.config.devices.options.clone();
    if !options.enabled {
        debug!("device sync disabled");
        return stats;
    }
    let directory = Arc::clone(&orch.directory);
    let dir = directory.as_ref();

    let existing = orch.resolve_device(device).await;
    let desired = match desired_device(orch, dir, device, &options).await {
        Ok(desired) => desired,
        Err(reason) => {
            warn!(%reason, "device skipped");
            stats.record_skip(&device.name, &reason);
            return stats;
        }
    };

    let key = device.name.clone();
    let source = PayloadSource::new(DEVICE_REFS, move |_: &RemoteRecord| Some(key.clone()));
    let compare_options =
        CompareOptions::new(EntityKind::Device).fields(options.enabled_fields(DEVICE_FIELDS));
    let diff = compare(
        vec![desired],
        existing.into_iter().collect(),
        &source,
        &compare_options,
    );
    debug!(summary = %diff.summary(), "device compared");

    for item in &diff.to_skip {
        if let Some(reason) = &item.skip_reason {
            stats.record_skip(&item.key, reason);
        }
    }

    let creates: Vec<CreateOp> = diff
        .to_create
        .iter()
        .filter_map(|item| {
            let local = item.local.as_ref()?;
            if !options.create_missing {
                stats.record_skip(&item.key, &SkipReason::NotActionable("create disabled".into()));
                return None;
            }
            Some(CreateOp {
                key: item.key.clone(),
                payload: local.attrs.clone(),
            })
        })
        .collect();
    let created = orch
        .executor
        .execute(dir, &CreateTarget(EntityKind::Device), &creates, &mut stats)
        .await;
    for record in created.into_iter().flatten() {
        info!(id = record.id(), "device created");
        orch.cache.remember_device(record);
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
        .execute(dir, &UpdateTarget(EntityKind::Device), &updates, &mut stats)
        .await;
    for (record, result) in merged.into_iter().zip(updated) {
        if result.is_some() {
            orch.cache.remember_device(record);
        }
    }

    stats
}

/// Builds the desired payload, resolving every reference.
async fn desired_device(
    orch: &mut SyncOrch,
    dir: &dyn Directory,
    device: &DeviceRecord,
    options: &EntityOptions,
) -> Result<PlannedRecord, SkipReason> {
    let pick = |value: &Option<String>, key: &str| -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| options.default_value(key))
            .map(str::to_string)
    };

    let mut attrs = Payload::new();
    attrs.insert("name".into(), Value::from(device.name.as_str()));

    let site = pick(&device.site, "site").ok_or_else(|| SkipReason::NotActionable("no site".into()))?;
    let site = reference(orch, dir, EntityKind::Site, &site, Payload::new())
        .await
        .ok_or_else(|| SkipReason::Unresolved(format!("site {}", site)))?;
    attrs.insert("site".into(), Value::from(site.id()));

    let role = pick(&device.role, "role").ok_or_else(|| SkipReason::NotActionable("no role".into()))?;
    let role = reference(orch, dir, EntityKind::DeviceRole, &role, Payload::new())
        .await
        .ok_or_else(|| SkipReason::Unresolved(format!("role {}", role)))?;
    attrs.insert("role".into(), Value::from(role.id()));

    let manufacturer = pick(&device.manufacturer, "manufacturer")
        .ok_or_else(|| SkipReason::NotActionable("no manufacturer".into()))?;
    let manufacturer = reference(orch, dir, EntityKind::Manufacturer, &manufacturer, Payload::new())
        .await
        .ok_or_else(|| SkipReason::Unresolved(format!("manufacturer {}", manufacturer)))?;

    let model = pick(&device.model, "device_type")
        .ok_or_else(|| SkipReason::NotActionable("no model".into()))?;
    let mut extra = Payload::new();
    extra.insert("manufacturer".into(), Value::from(manufacturer.id()));
    let device_type = reference(orch, dir, EntityKind::DeviceType, &model, extra)
        .await
        .ok_or_else(|| SkipReason::Unresolved(format!("device type {}", model)))?;
    attrs.insert("device_type".into(), Value::from(device_type.id()));

    for (kind, field, value) in [
        (EntityKind::Platform, "platform", &device.platform),
        (EntityKind::Tenant, "tenant", &device.tenant),
    ] {
        let Some(name) = pick(value, field) else {
            continue;
        };
        match reference(orch, dir, kind, &name, Payload::new()).await {
            Some(found) => {
                attrs.insert(field.into(), Value::from(found.id()));
            }
            None => warn!(%kind, %name, "optional reference unresolved, leaving unset"),
        }
    }

    if let Some(serial) = device.serial.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        attrs.insert("serial".into(), Value::from(serial));
    }
    let status = pick(&device.status, "status").unwrap_or_else(|| DEFAULT_STATUS.to_string());
    attrs.insert("status".into(), Value::from(status.to_ascii_lowercase()));

    Ok(PlannedRecord::new(device.name.clone(), attrs))
}

async fn reference(
    orch: &mut SyncOrch,
    dir: &dyn Directory,
    kind: EntityKind,
    name: &str,
    extra: Payload,
) -> Option<RemoteRecord> {
    orch.resolver
        .resolve_or_create(dir, &mut orch.cache, kind, name, extra)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use nbsync_core::{CallOp, MemoryDirectory};
    use pretty_assertions::assert_eq;

    fn record() -> DeviceRecord {
        DeviceRecord {
            name: "leaf1".into(),
            serial: Some("SN1".into()),
            model: Some("DCS-7050SX3".into()),
            manufacturer: Some("Arista".into()),
            site: Some("DC 1".into()),
            role: Some("Leaf".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_creates_device_and_references() {
        let dir = Arc::new(MemoryDirectory::new());
        let mut orch = SyncOrch::new(dir.clone(), SyncConfig::default());

        let stats = sync_device(&mut orch, &record()).await;

        assert_eq!(stats.created, 1);
        let device = dir.find_by_name(EntityKind::Device, "leaf1").unwrap();
        let site = dir.find_by_name(EntityKind::Site, "DC 1").unwrap();
        assert_eq!(device.ref_id("site"), Some(site.id()));
        assert_eq!(device.str("status"), Some("active"));
        assert_eq!(dir.len(EntityKind::DeviceType), 1);
        assert!(orch.cache().stats().misses > 0);
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let dir = Arc::new(MemoryDirectory::new());
        let mut first = SyncOrch::new(dir.clone(), SyncConfig::default());
        sync_device(&mut first, &record()).await;
        dir.clear_calls();

        let mut second = SyncOrch::new(dir.clone(), SyncConfig::default());
        let stats = sync_device(&mut second, &record()).await;

        assert_eq!(stats.created + stats.updated, 0);
        assert_eq!(stats.skipped, 1);
        assert!(dir.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_serial_change_is_an_update() {
        let dir = Arc::new(MemoryDirectory::new());
        let mut first = SyncOrch::new(dir.clone(), SyncConfig::default());
        sync_device(&mut first, &record()).await;

        let mut second = SyncOrch::new(dir.clone(), SyncConfig::default());
        let changed = DeviceRecord {
            serial: Some("SN2".into()),
            ..record()
        };
        let stats = sync_device(&mut second, &changed).await;

        assert_eq!(stats.updated, 1);
        assert_eq!(dir.call_count(CallOp::BulkUpdate, EntityKind::Device), 1);
        let device = dir.find_by_name(EntityKind::Device, "leaf1").unwrap();
        assert_eq!(device.str("serial"), Some("SN2"));
    }

    #[tokio::test]
    async fn test_missing_site_uses_default_or_skips() {
        let dir = Arc::new(MemoryDirectory::new());
        let bare = DeviceRecord {
            site: None,
            ..record()
        };

        let mut orch = SyncOrch::new(dir.clone(), SyncConfig::default());
        let stats = sync_device(&mut orch, &bare).await;
        assert_eq!(stats.skipped, 1);
        assert_eq!(dir.len(EntityKind::Device), 0);

        let mut config = SyncConfig::default();
        config
            .devices
            .options
            .defaults
            .insert("site".into(), "Lab".into());
        let mut orch = SyncOrch::new(dir.clone(), config);
        let stats = sync_device(&mut orch, &bare).await;
        assert_eq!(stats.created, 1);
        assert!(dir.find_by_name(EntityKind::Site, "Lab").is_some());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dir = Arc::new(MemoryDirectory::new());
        let mut config = SyncConfig::default();
        config.general.dry_run = true;
        let mut orch = SyncOrch::new(dir.clone(), config);

        let stats = sync_device(&mut orch, &record()).await;

        assert_eq!(stats.created, 1);
        assert!(dir.mutating_calls().is_empty());
        let cached = orch.resolve_device(&record()).await.unwrap();
        assert!(cached.is_placeholder());
    }
}
