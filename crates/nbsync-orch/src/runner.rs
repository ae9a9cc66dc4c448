//! Runs the entity pipeline over many devices.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use nbsync_core::{Directory, RunContext, StatCounters, SyncStats};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cables::sync_cables;
use crate::config::SyncConfig;
use crate::devices::sync_device;
use crate::interfaces::sync_interfaces;
use crate::inventory::sync_inventory;
use crate::ip_addresses::sync_ip_addresses;
use crate::orchestrator::{RunClaims, SyncOrch};
use crate::records::DeviceSnapshot;
use crate::vlans::sync_vlans;

/// Outcome of one device's pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    pub device: String,
    pub run_id: Uuid,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per entity, in pipeline order.
    pub entities: Vec<SyncStats>,
}

impl DeviceReport {
    /// Stats of one entity family.
    pub fn entity(&self, name: &str) -> Option<&SyncStats> {
        self.entities.iter().find(|s| s.entity == name)
    }

    /// Counters summed over every entity.
    pub fn totals(&self) -> StatCounters {
        self.entities
            .iter()
            .fold(StatCounters::default(), |mut acc, stats| {
                let c = stats.counters();
                acc.created += c.created;
                acc.updated += c.updated;
                acc.deleted += c.deleted;
                acc.skipped += c.skipped;
                acc.failed += c.failed;
                acc.mac_assigned += c.mac_assigned;
                acc
            })
    }

    pub fn has_failures(&self) -> bool {
        self.entities.iter().any(|s| s.failed > 0)
    }
}

/// Runs device → VLANs → interfaces → IP addresses → cables → inventory
/// for one device, on a fresh orchestrator. `claims` is shared by every
/// device of the run.
pub async fn sync_snapshot(
    directory: Arc<dyn Directory>,
    config: SyncConfig,
    snapshot: &DeviceSnapshot,
    claims: RunClaims,
) -> DeviceReport {
    let ctx = RunContext::new(config.general.dry_run);
    let started_at = ctx.started_at;
    let run_id = ctx.run_id;
    let dry_run = ctx.dry_run;
    let mut orch = SyncOrch::with_context(directory, config, ctx).with_claims(claims);
    let device = &snapshot.device;

    let entities = vec![
        sync_device(&mut orch, device).await,
        sync_vlans(&mut orch, device, &snapshot.interfaces, &snapshot.vlans).await,
        sync_interfaces(&mut orch, device, &snapshot.interfaces).await,
        sync_ip_addresses(&mut orch, device, &snapshot.ip_addresses).await,
        sync_cables(&mut orch, device, &snapshot.neighbors).await,
        sync_inventory(&mut orch, device, &snapshot.inventory).await,
    ];

    let report = DeviceReport {
        device: device.name.clone(),
        run_id,
        dry_run,
        started_at,
        finished_at: Utc::now(),
        entities,
    };
    if report.has_failures() {
        warn!(device = %report.device, totals = ?report.totals(), "device synced with failures");
    } else {
        info!(device = %report.device, totals = ?report.totals(), "device synced");
    }
    report
}

/// Syncs every snapshot, up to `general.concurrency` devices at a time.
///
/// Each device gets its own orchestrator and cache; cable claims are shared
/// so a link seen from both ends is created once. Reports come back in
/// input order.
pub async fn run_devices(
    directory: Arc<dyn Directory>,
    config: &SyncConfig,
    snapshots: &[DeviceSnapshot],
) -> Vec<DeviceReport> {
    let concurrency = config.general.concurrency.max(1);
    info!(devices = snapshots.len(), concurrency, "starting sync");
    let claims = RunClaims::new();

    let mut reports: Vec<(usize, DeviceReport)> = stream::iter(snapshots.iter().enumerate())
        .map(|(index, snapshot)| {
            let directory = Arc::clone(&directory);
            let config = config.clone();
            let claims = claims.clone();
            async move { (index, sync_snapshot(directory, config, snapshot, claims).await) }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    reports.sort_by_key(|(index, _)| *index);
    reports.into_iter().map(|(_, report)| report).collect()
}
