//! Whole-device runs through `run_devices`.

use nbsync_core::{EntityKind, MemoryDirectory, StatCounters};
use nbsync_orch::{
    run_devices, DeviceRecord, DeviceSnapshot, IdentityType, InterfaceRecord, InventoryRecord,
    IpRecord, NeighborIdentity, NeighborRecord, SyncConfig, VlanRecord,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn device(name: &str) -> DeviceRecord {
    DeviceRecord {
        name: name.into(),
        serial: Some(format!("SN-{}", name)),
        model: Some("C9300-48P".into()),
        manufacturer: Some("Cisco".into()),
        site: Some("dc1".into()),
        role: Some("access".into()),
        ..Default::default()
    }
}

fn snapshot(name: &str, peer: &str) -> DeviceSnapshot {
    DeviceSnapshot {
        device: device(name),
        interfaces: vec![
            InterfaceRecord {
                name: "Gi1/0/1".into(),
                description: Some("users".into()),
                status: Some("connected".into()),
                mode: Some("access".into()),
                untagged_vlan: Some("10".into()),
                ip_addresses: vec!["10.0.0.1/24".into()],
                ..Default::default()
            },
            InterfaceRecord {
                name: "Gi1/0/2".into(),
                description: Some(format!("to {}", peer)),
                ..Default::default()
            },
        ],
        ip_addresses: vec![IpRecord {
            address: format!("10.0.{}.1/24", &name[2..]),
            interface: "Gi1/0/1".into(),
            primary: true,
            ..Default::default()
        }],
        neighbors: vec![NeighborRecord {
            local_port: "Gi1/0/2".into(),
            remote_port: "Gi1/0/2".into(),
            identity: NeighborIdentity::new(IdentityType::Hostname, format!("{}.lab.example", peer)),
            fallback: None,
        }],
        inventory: vec![InventoryRecord {
            name: "Chassis".into(),
            part_id: Some("C9300-48P".into()),
            serial: Some(format!("SN-{}", name)),
            ..Default::default()
        }],
        vlans: vec![VlanRecord {
            vid: 10,
            name: Some("users".into()),
            ..Default::default()
        }],
    }
}

fn sequential() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.general.concurrency = 1;
    config
}

#[tokio::test]
async fn test_two_devices_from_empty_directory() {
    let dir = Arc::new(MemoryDirectory::new());
    let snapshots = vec![snapshot("sw1", "sw2"), snapshot("sw2", "sw1")];

    let reports = run_devices(dir.clone(), &sequential(), &snapshots).await;

    let names: Vec<&str> = reports.iter().map(|r| r.device.as_str()).collect();
    assert_eq!(names, vec!["sw1", "sw2"]);
    assert!(reports.iter().all(|r| !r.has_failures()));

    assert_eq!(dir.len(EntityKind::Device), 2);
    assert_eq!(dir.len(EntityKind::Site), 1);
    assert_eq!(dir.len(EntityKind::DeviceType), 1);
    assert_eq!(dir.len(EntityKind::Vlan), 1);
    assert_eq!(dir.len(EntityKind::Interface), 4);
    assert_eq!(dir.len(EntityKind::IpAddress), 2);
    assert_eq!(dir.len(EntityKind::InventoryItem), 2);
    // sw2 did not exist yet when sw1 ran; the link lands once, from sw2.
    assert_eq!(dir.len(EntityKind::Cable), 1);
    assert_eq!(reports[0].entity("cables").map(|s| s.skipped), Some(1));
    assert_eq!(reports[1].entity("cables").map(|s| s.created), Some(1));

    let sw1 = dir.find_by_name(EntityKind::Device, "sw1").unwrap();
    assert!(sw1.ref_id("primary_ip4").is_some());
    let vlan = dir.find_by_name(EntityKind::Vlan, "users").unwrap();
    let access = dir
        .records(EntityKind::Interface)
        .into_iter()
        .find(|i| i.ref_id("device") == Some(sw1.id()) && i.name() == Some("Gi1/0/1"))
        .unwrap();
    assert_eq!(access.ref_id("untagged_vlan"), Some(vlan.id()));
}

#[tokio::test]
async fn test_second_run_writes_nothing() {
    let dir = Arc::new(MemoryDirectory::new());
    let snapshots = vec![snapshot("sw1", "sw2"), snapshot("sw2", "sw1")];
    run_devices(dir.clone(), &sequential(), &snapshots).await;
    dir.clear_calls();

    let reports = run_devices(dir.clone(), &sequential(), &snapshots).await;

    assert!(dir.mutating_calls().is_empty(), "{:?}", dir.mutating_calls());
    for report in &reports {
        let totals = report.totals();
        assert_eq!(
            (totals.created, totals.updated, totals.deleted, totals.failed),
            (0, 0, 0, 0),
            "{}",
            report.device
        );
    }
}

#[tokio::test]
async fn test_dry_run_reports_the_same_counters() {
    let snapshots = vec![snapshot("sw1", "sw2")];

    let dry_dir = Arc::new(MemoryDirectory::new());
    let mut dry_config = sequential();
    dry_config.general.dry_run = true;
    let dry = run_devices(dry_dir.clone(), &dry_config, &snapshots).await;

    let real_dir = Arc::new(MemoryDirectory::new());
    let real = run_devices(real_dir, &sequential(), &snapshots).await;

    assert!(dry_dir.mutating_calls().is_empty());
    assert!(dry[0].dry_run);
    let counters = |r: &nbsync_orch::DeviceReport| -> Vec<(String, StatCounters)> {
        r.entities
            .iter()
            .map(|s| (s.entity.clone(), s.counters()))
            .collect()
    };
    assert_eq!(counters(&dry[0]), counters(&real[0]));
}

#[tokio::test]
async fn test_reports_keep_input_order_under_concurrency() {
    let dir = Arc::new(MemoryDirectory::new());
    dir.seed(EntityKind::Site, serde_json::json!({"name": "dc1", "slug": "dc1"}));
    let snapshots: Vec<DeviceSnapshot> = (0..6)
        .map(|i| DeviceSnapshot {
            device: DeviceRecord {
                name: format!("leaf{}", i),
                ..device("unused")
            },
            ..Default::default()
        })
        .collect();
    let mut config = SyncConfig::default();
    config.general.concurrency = 3;

    let reports = run_devices(dir.clone(), &config, &snapshots).await;

    let names: Vec<String> = reports.iter().map(|r| r.device.clone()).collect();
    let expected: Vec<String> = (0..6).map(|i| format!("leaf{}", i)).collect();
    assert_eq!(names, expected);
    assert_eq!(reports.iter().map(|r| r.entities.len()).collect::<Vec<_>>(), vec![6; 6]);
}

#[tokio::test]
async fn test_link_seen_from_both_ends_concurrently_is_one_cable() {
    let dir = Arc::new(MemoryDirectory::new());
    let snapshots = vec![snapshot("sw1", "sw2"), snapshot("sw2", "sw1")];
    let unlinked: Vec<DeviceSnapshot> = snapshots
        .iter()
        .cloned()
        .map(|mut s| {
            s.neighbors.clear();
            s
        })
        .collect();
    run_devices(dir.clone(), &sequential(), &unlinked).await;
    assert_eq!(dir.len(EntityKind::Cable), 0);

    // Both devices fetch their cables before either creates one.
    dir.interleave_calls();
    let mut config = SyncConfig::default();
    config.general.concurrency = 2;
    let reports = run_devices(dir.clone(), &config, &snapshots).await;

    assert!(reports.iter().all(|r| !r.has_failures()));
    assert_eq!(dir.len(EntityKind::Cable), 1);
    let created: u64 = reports
        .iter()
        .filter_map(|r| r.entity("cables"))
        .map(|s| s.created)
        .sum();
    assert_eq!(created, 1);
}
