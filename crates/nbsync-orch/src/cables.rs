//! Cables between devices, from neighbor discovery.
//!
//! A link is seen from both of its ends. Each cable is keyed by its
//! unordered pair of interface endpoints, so both sightings collapse to one
//! key and one directory record.

use nbsync_core::{
    compare, CompareOptions, CreateOp, CreateTarget, DeleteOp, DeleteTarget, Directory,
    EntityKind, Payload, Query, RecordId, RemoteRecord, SkipReason, SyncStats, UpdateOp,
    UpdateTarget,
};
use nbsync_types::InterfaceClass;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::interfaces::choice;
use crate::orchestrator::SyncOrch;
use crate::planned::{PayloadSource, PlannedRecord};
use crate::records::{DeviceRecord, IdentityType, NeighborIdentity, NeighborRecord};

pub const CABLE_FIELDS: &[&str] = &["status"];

const CABLE_REFS: &[&str] = &["a_device", "a_interface", "b_device", "b_interface"];

const CONNECTED: &str = "connected";

/// Why a cable cannot end on an interface of this class, if it cannot.
fn uncableable(class: InterfaceClass) -> Option<&'static str> {
    match class {
        _ if class.is_cableable() => None,
        InterfaceClass::Lag => Some("LAG endpoint"),
        _ => Some("virtual endpoint"),
    }
}

/// Class of a directory interface from its stored type, else its name.
fn remote_class(interface: &RemoteRecord, port: &str) -> InterfaceClass {
    let kind = interface.get("type").and_then(choice);
    match kind.as_ref().and_then(|k| k.as_text()) {
        Some(t) if t.eq_ignore_ascii_case("lag") => InterfaceClass::Lag,
        Some(t) if t.eq_ignore_ascii_case("virtual") => InterfaceClass::Virtual,
        _ => InterfaceClass::of(port),
    }
}

/// Label of one cable end: the interface id, or `device:port` for an
/// interface that only exists as a dry-run placeholder.
fn endpoint(interface: &RemoteRecord, device: &str, port: &str) -> String {
    if interface.is_placeholder() {
        format!("{}:{}", device, port)
    } else {
        interface.id().to_string()
    }
}

/// Key of a cable, independent of which end reported it.
///
/// ```
/// use nbsync_orch::cables::cable_key;
///
/// assert_eq!(cable_key("12", "7"), "7-12");
/// assert_eq!(cable_key("7", "12"), "7-12");
/// ```
pub fn cable_key(a: &str, b: &str) -> String {
    let order = |s: &str| (s.parse::<u64>().ok(), s.to_string());
    if order(a) <= order(b) {
        format!("{}-{}", a, b)
    } else {
        format!("{}-{}", b, a)
    }
}

fn remote_key(remote: &RemoteRecord) -> Option<String> {
    let a = remote.ref_id("a_interface")?;
    let b = remote.ref_id("b_interface")?;
    Some(cable_key(&a.to_string(), &b.to_string()))
}

/// Interface ids at either end of a directory cable.
fn ends(remote: &RemoteRecord) -> [Option<RecordId>; 2] {
    [remote.ref_id("a_interface"), remote.ref_id("b_interface")]
}

/// Reconciles the cables of one device.
///
/// For every neighbor the peer device is resolved from the primary identity,
/// then the fallback. Adjacencies on LAG or virtual interfaces are skipped.
/// A port the directory already cables to a different peer is left alone,
/// and a link another device of the run already claimed is not created twice.
#[instrument(skip_all, fields(run = %orch.ctx().short_id(), device = %device.name))]
pub async fn sync_cables(
    orch: &mut SyncOrch,
    device: &DeviceRecord,
    neighbors: &[NeighborRecord],
) -> SyncStats {
    let mut stats = SyncStats::new("cables");
    let config = orch.config.cables.clone();
    if !config.options.enabled {
        debug!("cable sync disabled");
        return stats;
    }
    let directory = Arc::clone(&orch.directory);
    let dir = directory.as_ref();

    let Some(remote_device) = orch.resolve_device(device).await else {
        warn!("device not found in directory, skipping cables");
        stats.record_skip(&device.name, &SkipReason::Unresolved("device".into()));
        return stats;
    };
    let device_id = remote_device.id();

    let query = Query::new().eq_any(&["a_device", "b_device"], device_id);
    let remote = match dir.filter(EntityKind::Cable, &query).await {
        Ok(remote) => remote,
        Err(e) => {
            warn!(error = %e, "cable fetch failed, skipping cables");
            stats.record_skip(&device.name, &SkipReason::Unresolved("existing cables".into()));
            return stats;
        }
    };

    // Interface id → key of the directory cable on it.
    let mut cabled: HashMap<RecordId, String> = HashMap::new();
    for cable in &remote {
        if let Some(key) = remote_key(cable) {
            for end in ends(cable).into_iter().flatten() {
                cabled.insert(end, key.clone());
            }
        }
    }

    let mut locals = Vec::new();
    // Directory cables on ports whose neighbor could not be resolved; they
    // are not known to be stale.
    let mut protected: HashSet<String> = HashSet::new();

    for neighbor in neighbors {
        let port = neighbor.local_port.trim();
        let blocked = uncableable(InterfaceClass::of(port))
            .or_else(|| uncableable(InterfaceClass::of(neighbor.remote_port.trim())));
        if let Some(why) = blocked {
            stats.record_skip(port, &SkipReason::NotActionable(why.into()));
            continue;
        }
        let Some(local_iface) = orch.cache.find_interface(dir, device_id, port).await else {
            stats.record_skip(port, &SkipReason::Unresolved(format!("interface {}", port)));
            continue;
        };

        let peer = resolve_peer(orch, dir, &config.identity_types, neighbor).await;
        let peer_iface = match &peer {
            Some(peer) => {
                orch.cache
                    .find_interface(dir, peer.id(), neighbor.remote_port.trim())
                    .await
            }
            None => None,
        };
        let (Some(peer), Some(peer_iface)) = (peer, peer_iface) else {
            let what = format!("neighbor {}", neighbor.identity.value);
            if let Some(existing) = cabled.get(&local_iface.id()) {
                protected.insert(existing.clone());
            }
            stats.record_skip(port, &SkipReason::Unresolved(what));
            continue;
        };
        if let Some(why) = uncableable(remote_class(&peer_iface, neighbor.remote_port.trim())) {
            stats.record_skip(port, &SkipReason::NotActionable(why.into()));
            continue;
        }

        let peer_name = peer.name().unwrap_or(&neighbor.identity.value).to_string();
        let key = cable_key(
            &endpoint(&local_iface, &device.name, port),
            &endpoint(&peer_iface, &peer_name, neighbor.remote_port.trim()),
        );

        let conflict = [local_iface.id(), peer_iface.id()]
            .into_iter()
            .filter(|id| *id != RemoteRecord::PLACEHOLDER_ID)
            .find_map(|id| cabled.get(&id).filter(|existing| **existing != key).cloned());
        if let Some(existing) = conflict {
            protected.insert(existing.clone());
            stats.record_skip(
                &key,
                &SkipReason::NotActionable(format!("port already cabled ({})", existing)),
            );
            continue;
        }

        let mut attrs = Payload::new();
        attrs.insert("a_device".into(), Value::from(device_id));
        attrs.insert("a_interface".into(), Value::from(local_iface.id()));
        attrs.insert("b_device".into(), Value::from(peer.id()));
        attrs.insert("b_interface".into(), Value::from(peer_iface.id()));
        attrs.insert("status".into(), Value::from(CONNECTED));
        locals.push(PlannedRecord::new(key, attrs));
    }

    let source = PayloadSource::new(CABLE_REFS, remote_key);
    let options = CompareOptions::new(EntityKind::Cable)
        .fields(config.options.enabled_fields(CABLE_FIELDS))
        .cleanup(orch.config.cleanup_for(&config.options));
    let diff = compare(locals, remote, &source, &options);
    info!(summary = %diff.summary(), "cables compared");

    for item in &diff.to_skip {
        if let Some(reason) = &item.skip_reason {
            stats.record_skip(&item.key, reason);
        }
    }

    let mut creates = Vec::new();
    for item in &diff.to_create {
        let Some(local) = &item.local else { continue };
        if !config.options.create_missing {
            stats.record_skip(&item.key, &SkipReason::NotActionable("create disabled".into()));
            continue;
        }
        if !orch.claims.claim(&item.key) {
            debug!(key = %item.key, "cable already claimed in this run");
            stats.record_skip(
                &item.key,
                &SkipReason::NotActionable("created from the other end".into()),
            );
            continue;
        }
        creates.push(CreateOp {
            key: item.key.clone(),
            payload: local.attrs.clone(),
        });
    }

    let mut updates = Vec::new();
    for item in &diff.to_update {
        let (Some(local), Some(current)) = (&item.local, &item.remote) else {
            continue;
        };
        if !config.options.update_existing {
            stats.record_skip(&item.key, &SkipReason::NotActionable("update disabled".into()));
            continue;
        }
        updates.push(UpdateOp {
            key: item.key.clone(),
            id: current.id(),
            changes: local.changes(&item.changes),
            notes: item.changes.iter().map(ToString::to_string).collect(),
        });
    }

    let mut deletes = Vec::new();
    for item in &diff.to_delete {
        let Some(id) = item.remote_id() else { continue };
        if protected.contains(&item.key) {
            stats.record_skip(&item.key, &SkipReason::NotActionable("neighbor unresolved".into()));
            continue;
        }
        deletes.push(DeleteOp {
            key: item.key.clone(),
            id,
        });
    }

    let executor = orch.executor;
    executor
        .execute(dir, &CreateTarget(EntityKind::Cable), &creates, &mut stats)
        .await;
    executor
        .execute(dir, &UpdateTarget(EntityKind::Cable), &updates, &mut stats)
        .await;
    executor
        .execute(dir, &DeleteTarget(EntityKind::Cable), &deletes, &mut stats)
        .await;

    stats
}

/// Resolves the peer device from the primary identity, then the fallback.
async fn resolve_peer(
    orch: &mut SyncOrch,
    dir: &dyn Directory,
    allowed: &[IdentityType],
    neighbor: &NeighborRecord,
) -> Option<RemoteRecord> {
    for identity in std::iter::once(&neighbor.identity).chain(neighbor.fallback.as_ref()) {
        if let Some(found) = resolve_identity(orch, dir, allowed, identity).await {
            return Some(found);
        }
    }
    None
}

async fn resolve_identity(
    orch: &mut SyncOrch,
    dir: &dyn Directory,
    allowed: &[IdentityType],
    identity: &NeighborIdentity,
) -> Option<RemoteRecord> {
    let value = identity.value.trim();
    if value.is_empty() || identity.kind == IdentityType::Unknown || !allowed.contains(&identity.kind) {
        debug!(kind = %identity.kind, value, "identity not usable");
        return None;
    }
    match identity.kind {
        IdentityType::Hostname => {
            if let Some(found) = orch.cache.find_device(dir, value).await {
                return Some(found);
            }
            let short = value.split('.').next().unwrap_or(value);
            if short != value {
                return orch.cache.find_device(dir, short).await;
            }
            None
        }
        IdentityType::Mac | IdentityType::Ip => orch.cache.find_device_by_address(dir, value).await,
        IdentityType::Unknown => None,
    }
}
