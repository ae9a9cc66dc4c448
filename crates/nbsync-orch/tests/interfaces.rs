//! Interface sync against the in-memory directory.

use nbsync_core::{CallOp, EntityKind, MemoryDirectory, RecordId, StatCounters, SyncStats};
use nbsync_orch::interfaces::sync_interfaces;
use nbsync_orch::{DeviceRecord, InterfaceRecord, MacPolicy, SyncConfig, SyncOrch};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

struct Lab {
    dir: Arc<MemoryDirectory>,
    device: RecordId,
    vlan10: RecordId,
    vlan20: RecordId,
}

fn lab() -> Lab {
    let dir = Arc::new(MemoryDirectory::new());
    let site = dir.seed(EntityKind::Site, json!({"name": "dc1", "slug": "dc1"}));
    let device = dir.seed(EntityKind::Device, json!({"name": "sw1", "site": site}));
    let vlan10 = dir.seed(EntityKind::Vlan, json!({"vid": 10, "name": "users", "site": site}));
    let vlan20 = dir.seed(EntityKind::Vlan, json!({"vid": 20, "name": "voice", "site": site}));
    Lab {
        dir,
        device,
        vlan10,
        vlan20,
    }
}

fn sw1() -> DeviceRecord {
    DeviceRecord {
        name: "sw1".into(),
        ..Default::default()
    }
}

fn iface(name: &str) -> InterfaceRecord {
    InterfaceRecord {
        name: name.into(),
        ..Default::default()
    }
}

fn bulk_create_labels(dir: &MemoryDirectory) -> Vec<Vec<String>> {
    dir.calls()
        .into_iter()
        .filter(|c| c.op == CallOp::BulkCreate && c.kind == EntityKind::Interface)
        .map(|c| c.labels)
        .collect()
}

async fn run(
    dir: &Arc<MemoryDirectory>,
    config: SyncConfig,
    interfaces: &[InterfaceRecord],
) -> SyncStats {
    let mut orch = SyncOrch::new(dir.clone(), config);
    sync_interfaces(&mut orch, &sw1(), interfaces).await
}

#[tokio::test]
async fn test_matching_description_is_a_skip() {
    let lab = lab();
    lab.dir.seed(
        EntityKind::Interface,
        json!({"device": lab.device, "name": "Gi0/1", "type": "1000base-t", "description": "old"}),
    );
    let local = InterfaceRecord {
        description: Some("old".into()),
        ..iface("Gi0/1")
    };

    let stats = run(&lab.dir, SyncConfig::default(), &[local]).await;

    assert_eq!(
        stats.counters(),
        StatCounters {
            skipped: 1,
            ..Default::default()
        }
    );
    assert!(lab.dir.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_stale_description_is_one_update() {
    let lab = lab();
    let id = lab.dir.seed(
        EntityKind::Interface,
        json!({"device": lab.device, "name": "Gi0/1", "type": "1000base-t", "description": "stale"}),
    );
    let local = InterfaceRecord {
        description: Some("old".into()),
        ..iface("Gi0/1")
    };

    let stats = run(&lab.dir, SyncConfig::default(), &[local]).await;

    assert_eq!(stats.updated, 1);
    assert_eq!(stats.details[0].message, r#"description: "stale" -> "old""#);
    let record = lab.dir.record(EntityKind::Interface, id).unwrap();
    assert_eq!(record.str("description"), Some("old"));
}

#[tokio::test]
async fn test_lag_created_before_members() {
    let lab = lab();
    let member = InterfaceRecord {
        lag: Some("Po1".into()),
        ..iface("Gi0/1")
    };

    let stats = run(&lab.dir, SyncConfig::default(), &[member, iface("Po1")]).await;

    assert_eq!(stats.created, 2);
    assert_eq!(
        bulk_create_labels(&lab.dir),
        vec![vec!["Po1".to_string()], vec!["Gi0/1".to_string()]]
    );
    let po1 = lab.dir.find_by_name(EntityKind::Interface, "Po1").unwrap();
    let gi = lab.dir.find_by_name(EntityKind::Interface, "Gi0/1").unwrap();
    assert_eq!(po1.str("type"), Some("lag"));
    assert_eq!(gi.ref_id("lag"), Some(po1.id()));
}

#[tokio::test]
async fn test_member_of_unknown_lag_is_not_created() {
    let lab = lab();
    let member = InterfaceRecord {
        lag: Some("Po9".into()),
        ..iface("Gi0/1")
    };

    let stats = run(&lab.dir, SyncConfig::default(), &[member, iface("Gi0/2")]).await;

    assert_eq!(stats.created, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.failed, 0);
    let skip = stats.details.iter().find(|d| d.key == "Gi0/1").unwrap();
    assert_eq!(skip.message, "unresolved parent LAG Port-channel9");
    assert!(lab.dir.find_by_name(EntityKind::Interface, "Gi0/1").is_none());
    assert_eq!(bulk_create_labels(&lab.dir), vec![vec!["Gi0/2".to_string()]]);
}

#[tokio::test]
async fn test_members_deleted_before_lags() {
    let lab = lab();
    let po1 = lab.dir.seed(
        EntityKind::Interface,
        json!({"device": lab.device, "name": "Po1", "type": "lag"}),
    );
    lab.dir.seed(
        EntityKind::Interface,
        json!({"device": lab.device, "name": "Gi0/1", "type": "1000base-t", "lag": po1}),
    );
    let mut config = SyncConfig::default();
    config.general.cleanup = true;

    let stats = run(&lab.dir, config, &[]).await;

    assert_eq!(stats.deleted, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(lab.dir.len(EntityKind::Interface), 0);
}

#[tokio::test]
async fn test_vlan_membership_resolved_by_site() {
    let lab = lab();
    let trunk = InterfaceRecord {
        mode: Some("trunk".into()),
        tagged_vlans: Some("10,20".into()),
        untagged_vlan: Some("10".into()),
        ..iface("Gi0/2")
    };

    run(&lab.dir, SyncConfig::default(), &[trunk.clone()]).await;

    let created = lab.dir.find_by_name(EntityKind::Interface, "Gi0/2").unwrap();
    assert_eq!(created.str("mode"), Some("tagged"));
    assert_eq!(created.ref_id("untagged_vlan"), Some(lab.vlan10));
    assert_eq!(created.ref_ids("tagged_vlans"), vec![lab.vlan10, lab.vlan20]);

    lab.dir.clear_calls();
    let stats = run(&lab.dir, SyncConfig::default(), &[trunk]).await;
    assert_eq!(stats.skipped, 1);
    assert!(lab.dir.mutating_calls().is_empty());
    // One VLAN fetch per scope, none per interface.
    assert_eq!(lab.dir.call_count(CallOp::Filter, EntityKind::Vlan), 2);
    assert_eq!(lab.dir.call_count(CallOp::Get, EntityKind::Vlan), 0);
}

#[tokio::test]
async fn test_unknown_vlan_leaves_field_and_notes_it() {
    let lab = lab();
    let id = lab.dir.seed(
        EntityKind::Interface,
        json!({"device": lab.device, "name": "Gi0/3", "type": "1000base-t", "mode": "access", "description": "x"}),
    );
    let local = InterfaceRecord {
        mode: Some("access".into()),
        untagged_vlan: Some("99".into()),
        description: Some("y".into()),
        ..iface("Gi0/3")
    };

    let stats = run(&lab.dir, SyncConfig::default(), &[local]).await;

    assert_eq!(stats.updated, 1);
    assert!(stats.details[0].message.contains("untagged VLAN 99 not found"));
    let record = lab.dir.record(EntityKind::Interface, id).unwrap();
    assert!(record.is_null("untagged_vlan"));
    assert_eq!(record.str("description"), Some("y"));
}

#[tokio::test]
async fn test_mac_assigned_after_create() {
    let lab = lab();
    let local = InterfaceRecord {
        mac: Some("00:11:22:33:44:55".into()),
        ..iface("Gi0/4")
    };

    let stats = run(&lab.dir, SyncConfig::default(), &[local]).await;

    assert_eq!((stats.created, stats.mac_assigned), (1, 1));
    let calls = lab.dir.mutating_calls();
    let ops: Vec<CallOp> = calls.iter().map(|c| c.op).collect();
    assert_eq!(ops, vec![CallOp::BulkCreate, CallOp::BulkAssignMac]);
    let record = lab.dir.find_by_name(EntityKind::Interface, "Gi0/4").unwrap();
    assert_eq!(record.str("mac_address"), Some("00:11:22:33:44:55"));
}

#[tokio::test]
async fn test_mac_post_sync_for_unchanged_interface() {
    let lab = lab();
    lab.dir.seed(
        EntityKind::Interface,
        json!({"device": lab.device, "name": "Gi0/5", "type": "1000base-t"}),
    );
    let mut config = SyncConfig::default();
    config.interfaces.mac_policy = MacPolicy::WithIp;
    let without_ip = InterfaceRecord {
        mac: Some("00:11:22:33:44:66".into()),
        ..iface("Gi0/5")
    };

    let stats = run(&lab.dir, config.clone(), &[without_ip.clone()]).await;
    assert_eq!((stats.skipped, stats.mac_assigned), (1, 0));

    let with_ip = InterfaceRecord {
        ip_addresses: vec!["10.1.1.1/24".into()],
        ..without_ip
    };
    let stats = run(&lab.dir, config, &[with_ip]).await;

    assert_eq!((stats.skipped, stats.updated, stats.mac_assigned), (1, 0, 1));
    assert_eq!(lab.dir.len(EntityKind::MacAddress), 1);
}

#[tokio::test]
async fn test_bulk_failure_isolates_bad_interface() {
    let lab = lab();
    lab.dir.reject(EntityKind::Interface, "description", "bad");
    let interfaces = [
        InterfaceRecord {
            description: Some("ok".into()),
            ..iface("Gi0/1")
        },
        InterfaceRecord {
            description: Some("bad".into()),
            ..iface("Gi0/2")
        },
        InterfaceRecord {
            description: Some("ok".into()),
            ..iface("Gi0/3")
        },
    ];

    let stats = run(&lab.dir, SyncConfig::default(), &interfaces).await;

    assert_eq!((stats.created, stats.failed), (2, 1));
    assert_eq!(lab.dir.len(EntityKind::Interface), 2);
    assert!(lab.dir.find_by_name(EntityKind::Interface, "Gi0/2").is_none());
}

#[tokio::test]
async fn test_excluded_interfaces_are_left_alone() {
    let lab = lab();
    lab.dir.seed(
        EntityKind::Interface,
        json!({"device": lab.device, "name": "Management1", "type": "1000base-t", "description": "oob"}),
    );
    let mut config = SyncConfig::default();
    config.general.cleanup = true;
    config.interfaces.exclude_interfaces = vec!["^Ma".into()];

    let stats = run(&lab.dir, config, &[iface("Gi0/1")]).await;

    assert_eq!((stats.created, stats.deleted, stats.skipped), (1, 0, 1));
    assert_eq!(lab.dir.len(EntityKind::Interface), 2);
}

#[tokio::test]
async fn test_dry_run_matches_real_run() {
    let interfaces = vec![
        iface("Po1"),
        InterfaceRecord {
            lag: Some("Po1".into()),
            mac: Some("00:11:22:33:44:77".into()),
            mode: Some("access".into()),
            untagged_vlan: Some("20".into()),
            ..iface("Gi0/1")
        },
        InterfaceRecord {
            description: Some("uplink".into()),
            ..iface("Gi0/2")
        },
    ];

    let dry = lab();
    let mut config = SyncConfig::default();
    config.general.dry_run = true;
    let dry_stats = run(&dry.dir, config, &interfaces).await;

    let real = lab();
    let real_stats = run(&real.dir, SyncConfig::default(), &interfaces).await;

    assert!(dry.dir.mutating_calls().is_empty());
    assert_eq!(dry_stats.counters(), real_stats.counters());
    assert_eq!(dry_stats.details, real_stats.details);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let lab = lab();
    let interfaces = vec![
        InterfaceRecord {
            status: Some("connected".into()),
            mtu: Some("9216".into()),
            ..iface("Po1")
        },
        InterfaceRecord {
            description: Some("".into()),
            status: Some("disabled".into()),
            speed: Some("1000Mb/s".into()),
            duplex: Some("a-full".into()),
            mode: Some("trunk".into()),
            tagged_vlans: Some("10,20".into()),
            lag: Some("Po1".into()),
            mac: Some("00:11:22:33:44:88".into()),
            ..iface("GigabitEthernet0/1")
        },
    ];

    let first = run(&lab.dir, SyncConfig::default(), &interfaces).await;
    assert_eq!(first.created, 2);

    lab.dir.clear_calls();
    let second = run(&lab.dir, SyncConfig::default(), &interfaces).await;

    assert_eq!(second.skipped, 2);
    assert!(lab.dir.mutating_calls().is_empty(), "{:?}", lab.dir.mutating_calls());
}

#[tokio::test]
async fn test_unknown_device_is_skipped() {
    let lab = lab();
    let mut orch = SyncOrch::new(lab.dir.clone(), SyncConfig::default());
    let ghost = DeviceRecord {
        name: "ghost".into(),
        ..Default::default()
    };

    let stats = sync_interfaces(&mut orch, &ghost, &[iface("Gi0/1")]).await;

    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.details[0].message, "unresolved device");
}
