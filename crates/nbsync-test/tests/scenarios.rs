//! Multi-entity scenarios run through the whole pipeline.

use nbsync_core::{CallOp, Directory, EntityKind, Payload, StatCounters};
use nbsync_test::fixtures::{interface_fixtures, inventory_fixtures, neighbor_fixtures};
use nbsync_test::{DirectoryVerifier, ReportVerifier, SnapshotBuilder, TestEnv, TestScenario};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn sequential() -> TestEnv {
    let mut env = TestEnv::new();
    env.config_mut().general.concurrency = 1;
    env
}

fn patch(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

#[tokio::test]
async fn test_description_drift_is_repaired() {
    let env = sequential();
    let snapshot = SnapshotBuilder::device("sw1")
        .with_interface(interface_fixtures::described("Gi0/1", "old"))
        .build();

    env.run(&[snapshot.clone()]).await;
    let reports = env.run(&[snapshot.clone()]).await;
    ReportVerifier::new(&reports)
        .assert_counters(
            "sw1",
            "interfaces",
            StatCounters {
                skipped: 1,
                ..Default::default()
            },
        )
        .unwrap();

    let verifier = DirectoryVerifier::new(env.directory());
    let gi = verifier.assert_exists(EntityKind::Interface, "Gi0/1").unwrap();
    env.directory()
        .update(EntityKind::Interface, gi.id(), patch(json!({"description": "stale"})))
        .await
        .unwrap();

    let reports = env.run(&[snapshot]).await;
    let interfaces = reports[0].entity("interfaces").unwrap();
    assert_eq!(interfaces.updated, 1);
    assert_eq!(interfaces.details[0].message, r#"description: "stale" -> "old""#);
    verifier
        .assert_field(EntityKind::Interface, "Gi0/1", "description", "old")
        .unwrap();
}

#[tokio::test]
async fn test_lag_written_before_members() {
    let env = sequential();
    let snapshot = SnapshotBuilder::device("sw1")
        .with_interfaces([
            interface_fixtures::lag_member("Gi0/1", "Po1"),
            interface_fixtures::lag_member("Gi0/2", "Po1"),
            interface_fixtures::lag("Po1"),
        ])
        .build();

    let reports = env.run(&[snapshot]).await;

    ReportVerifier::new(&reports).assert_no_failures().unwrap();
    let verifier = DirectoryVerifier::new(env.directory());
    assert_eq!(
        verifier.call_labels(CallOp::BulkCreate, EntityKind::Interface),
        vec![
            vec!["Po1".to_string()],
            vec!["Gi0/1".to_string(), "Gi0/2".to_string()],
        ]
    );
    let po1 = verifier.assert_exists(EntityKind::Interface, "Po1").unwrap();
    verifier
        .assert_field(EntityKind::Interface, "Gi0/2", "lag", po1.id())
        .unwrap();
}

#[tokio::test]
async fn test_config_file_drives_cleanup_and_fields() {
    let mut env = TestEnv::with_config_toml(
        r#"
[general]
cleanup = true

[interfaces.fields]
description = false
"#,
    )
    .unwrap();
    env.config_mut().general.concurrency = 1;

    let first = SnapshotBuilder::device("sw1")
        .with_interfaces([
            interface_fixtures::described("Gi0/1", "a"),
            interface_fixtures::described("Gi0/2", "b"),
        ])
        .build();
    env.run(&[first]).await;

    let second = SnapshotBuilder::device("sw1")
        .with_interface(interface_fixtures::described("Gi0/1", "changed"))
        .build();
    let reports = env.run(&[second]).await;

    ReportVerifier::new(&reports)
        .assert_counters(
            "sw1",
            "interfaces",
            StatCounters {
                deleted: 1,
                skipped: 1,
                ..Default::default()
            },
        )
        .unwrap();
    let verifier = DirectoryVerifier::new(env.directory());
    verifier.assert_absent(EntityKind::Interface, "Gi0/2").unwrap();
    // Switched-off fields are neither compared nor written.
    verifier
        .assert_field(EntityKind::Interface, "Gi0/1", "description", Value::Null)
        .unwrap();
}

#[tokio::test]
async fn test_cable_resolved_through_mac_fallback() {
    let env = sequential();
    let core = SnapshotBuilder::device("core1")
        .with_interface(interface_fixtures::with_mac(
            interface_fixtures::routed_port("Eth1", "10.9.0.1/31"),
            "00:aa:bb:cc:dd:01",
        ))
        .build();
    let access = SnapshotBuilder::device("sw1")
        .with_interface(interface_fixtures::routed_port("Gi0/48", "10.9.0.0/31"))
        .with_neighbor(neighbor_fixtures::with_mac_fallback(
            "Gi0/48",
            "mystery",
            "00aa.bbcc.dd01",
            "Eth1",
        ))
        .build();

    let snapshots = [core, access];
    let reports = env.run(&snapshots).await;

    ReportVerifier::new(&reports).assert_no_failures().unwrap();
    assert_eq!(reports[1].entity("cables").map(|s| s.created), Some(1));
    let verifier = DirectoryVerifier::new(env.directory());
    verifier.assert_count(EntityKind::Cable, 1).unwrap();

    env.directory().clear_calls();
    let again = env.run(&snapshots).await;
    assert_eq!(again[1].entity("cables").map(|s| s.skipped), Some(1));
    verifier.assert_no_writes().unwrap();
}

#[tokio::test]
async fn test_inventory_without_serial_is_protected() {
    let mut env = sequential();
    env.config_mut().general.cleanup = true;
    let snapshot = SnapshotBuilder::device("sw1")
        .with_inventory(inventory_fixtures::module("PSU 1", "PWR-C1-715WAC", "LIT1"))
        .with_inventory(inventory_fixtures::unserialized("Fan 1"))
        .build();

    let reports = env.run(&[snapshot]).await;

    let inventory = reports[0].entity("inventory").unwrap();
    assert_eq!((inventory.created, inventory.skipped), (1, 1));
    let verifier = DirectoryVerifier::new(env.directory());
    verifier.assert_count(EntityKind::InventoryItem, 1).unwrap();
    verifier
        .assert_field(EntityKind::InventoryItem, "PSU 1", "serial", "LIT1")
        .unwrap();
}

#[tokio::test]
async fn test_dry_run_on_drifted_directory() {
    let env = sequential();
    let snapshot = SnapshotBuilder::device("sw1")
        .with_vlan(10, "users")
        .with_interfaces([
            interface_fixtures::access_port("Gi0/1", 10),
            interface_fixtures::trunk_port("Gi0/2", 10, "10"),
        ])
        .with_ip("Gi0/1", "192.0.2.1/24", true)
        .build();
    env.run(&[snapshot.clone()]).await;

    let drifted = SnapshotBuilder::device("sw1")
        .with_vlan(10, "users")
        .with_vlan(20, "voice")
        .with_interfaces([
            interface_fixtures::access_port("Gi0/1", 20),
            interface_fixtures::trunk_port("Gi0/2", 10, "10,20"),
            interface_fixtures::described("Gi0/3", "new"),
        ])
        .with_ip("Gi0/1", "192.0.2.1/24", true)
        .build();

    env.directory().clear_calls();
    let dry = env.run_dry(&[drifted.clone()]).await;
    DirectoryVerifier::new(env.directory()).assert_no_writes().unwrap();

    let real = env.run(&[drifted]).await;

    let counters = |reports: &[nbsync_orch::DeviceReport]| -> Vec<(String, StatCounters)> {
        reports[0]
            .entities
            .iter()
            .map(|s| (s.entity.clone(), s.counters()))
            .collect()
    };
    assert_eq!(counters(&dry), counters(&real));
    assert_eq!(real[0].entity("vlans").map(|s| s.created), Some(1));
    assert_eq!(real[0].entity("interfaces").map(|s| (s.created, s.updated)), Some((1, 2)));
}

#[tokio::test]
async fn test_scenario_record_counts() {
    let scenario = TestScenario::new("three access switches")
        .add_device(
            SnapshotBuilder::device("sw1")
                .with_interface(interface_fixtures::access_port("Gi0/1", 10))
                .with_vlan(10, "users")
                .build(),
        )
        .add_device(
            SnapshotBuilder::device("sw2")
                .with_interface(interface_fixtures::access_port("Gi0/1", 10))
                .build(),
        )
        .add_device(
            SnapshotBuilder::device("sw3")
                .with_site("dc2")
                .with_interface(interface_fixtures::access_port("Gi0/1", 10))
                .build(),
        )
        .expect_count(EntityKind::Device, 3)
        .expect_count(EntityKind::Site, 2)
        .expect_count(EntityKind::Interface, 3)
        // dc2 gets its own generated VLAN 10.
        .expect_count(EntityKind::Vlan, 2);

    let env = sequential();
    let reports = env.run(&scenario.snapshots).await;

    ReportVerifier::new(&reports).assert_no_failures().unwrap();
    let verifier = DirectoryVerifier::new(env.directory());
    for (kind, count) in &scenario.expected_counts {
        verifier
            .assert_count(*kind, *count)
            .unwrap_or_else(|e| panic!("{}: {}", scenario.name, e));
    }
    verifier
        .assert_field(EntityKind::Vlan, "VLAN0010", "vid", 10)
        .unwrap();

    env.directory().clear_calls();
    let again = env.run(&scenario.snapshots).await;
    ReportVerifier::new(&again).assert_noop().unwrap();
    verifier.assert_no_writes().unwrap();
}
