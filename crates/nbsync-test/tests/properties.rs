//! Invariants checked over enumerated inputs.

use nbsync_core::{
    compare, BatchExecutor, ChangeKind, CompareOptions, CreateOp, CreateTarget, EntityKind,
    ExcludeSet, MemoryDirectory, Payload, RemoteRecord, SyncStats,
};
use nbsync_orch::{PayloadSource, PlannedRecord};
use nbsync_types::VlanSet;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::BTreeSet;

fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

fn local(key: &str, description: &str) -> PlannedRecord {
    PlannedRecord::new(key, payload(json!({"name": key, "description": description})))
}

fn remote(id: u64, key: &str, description: &str) -> RemoteRecord {
    RemoteRecord::new(id, payload(json!({"name": key, "description": description})))
}

/// Every subset of a small key universe, as (local, remote) pairs.
fn key_sets() -> Vec<(Vec<&'static str>, Vec<&'static str>)> {
    let universe = ["a", "b", "c", "skip-me"];
    let subsets: Vec<Vec<&str>> = (0u8..16)
        .map(|mask| {
            universe
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, k)| *k)
                .collect()
        })
        .collect();
    let mut pairs = Vec::new();
    for l in &subsets {
        for r in &subsets {
            pairs.push((l.clone(), r.clone()));
        }
    }
    pairs
}

#[test]
fn test_every_key_lands_in_exactly_one_list() {
    let source = PayloadSource::new(&[], |r: &RemoteRecord| r.name().map(String::from));
    let excludes = ExcludeSet::new(["^skip"].as_slice()).unwrap();

    for cleanup in [false, true] {
        for (locals, remotes) in key_sets() {
            let local_records: Vec<PlannedRecord> = locals
                .iter()
                .map(|k| local(k, if *k == "a" { "new" } else { "same" }))
                .collect();
            let remote_records: Vec<RemoteRecord> = remotes
                .iter()
                .enumerate()
                .map(|(i, k)| remote(i as u64 + 1, k, "same"))
                .collect();
            let options = CompareOptions::new(EntityKind::InventoryItem)
                .fields(["description"])
                .excludes(excludes.clone())
                .cleanup(cleanup);

            let diff = compare(local_records, remote_records, &source, &options);

            let mut seen: Vec<&str> = diff
                .to_create
                .iter()
                .chain(&diff.to_update)
                .chain(&diff.to_delete)
                .chain(&diff.to_skip)
                .map(|i| i.key.as_str())
                .collect();
            seen.sort_unstable();
            let expected: BTreeSet<&str> = locals.iter().chain(&remotes).copied().collect();
            assert_eq!(
                seen,
                expected.iter().copied().collect::<Vec<_>>(),
                "locals={:?} remotes={:?} cleanup={}",
                locals,
                remotes,
                cleanup
            );
            if let Some(item) = diff.find("skip-me") {
                assert_eq!(item.kind, ChangeKind::Skip);
            }
            if !cleanup {
                assert!(diff.to_delete.is_empty());
            }
        }
    }
}

#[test]
fn test_compare_is_idempotent_after_applying_changes() {
    let source = PayloadSource::new(&[], |r: &RemoteRecord| r.name().map(String::from));
    let options = CompareOptions::new(EntityKind::InventoryItem)
        .fields(["description"])
        .cleanup(true);

    for (locals, remotes) in key_sets() {
        let local_records: Vec<PlannedRecord> = locals.iter().map(|k| local(k, "want")).collect();
        let remote_records: Vec<RemoteRecord> = remotes
            .iter()
            .enumerate()
            .map(|(i, k)| remote(i as u64 + 1, k, "have"))
            .collect();

        let diff = compare(local_records.clone(), remote_records, &source, &options);

        // The remote side as it would be after the diff is applied.
        let mut applied: Vec<RemoteRecord> = Vec::new();
        for item in diff.to_create.iter().chain(&diff.to_update).chain(&diff.to_skip) {
            let Some(desired) = &item.local else { continue };
            applied.push(RemoteRecord::new(
                item.remote_id().unwrap_or(100 + applied.len() as u64),
                desired.attrs.clone(),
            ));
        }

        let again = compare(local_records, applied, &source, &options);
        assert_eq!(again.to_create.len() + again.to_update.len() + again.to_delete.len(), 0);
        assert_eq!(again.to_skip.len(), locals.len());
    }
}

#[test]
fn test_vlan_set_laws() {
    let samples: Vec<VlanSet> = ["", "1", "1-3", "2,4", "10,20,30-40", "4094", "1-4094"]
        .iter()
        .map(|s| VlanSet::from_range_str(s).unwrap())
        .collect();

    for a in &samples {
        assert_eq!(&VlanSet::from_range_str(&a.to_range_string()).unwrap(), a);
        for b in &samples {
            let added = a.added(b);
            let removed = a.removed(b);
            assert_eq!(a == b, added.is_empty() && removed.is_empty(), "{} vs {}", a, b);
            assert!(added.iter().all(|t| a.contains(t) && !b.contains(t)));
            assert!(removed.iter().all(|t| b.contains(t) && !a.contains(t)));
            assert_eq!(added, b.removed(a));
        }
    }
}

#[tokio::test]
async fn test_bulk_failure_isolates_each_bad_item() {
    for bad in 0..4usize {
        let directory = MemoryDirectory::new();
        directory.reject(EntityKind::Site, "name", format!("site{}", bad));
        let ops: Vec<CreateOp> = (0..4)
            .map(|i| CreateOp {
                key: format!("site{}", i),
                payload: payload(json!({"name": format!("site{}", i), "slug": format!("site{}", i)})),
            })
            .collect();
        let mut stats = SyncStats::new("sites");

        let results = BatchExecutor::new(false)
            .execute(&directory, &CreateTarget(EntityKind::Site), &ops, &mut stats)
            .await;

        assert_eq!((stats.created, stats.failed), (3, 1));
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.is_none(), i == bad, "item {} with bad {}", i, bad);
        }
        assert_eq!(directory.len(EntityKind::Site), 3);
    }
}

#[tokio::test]
async fn test_dry_run_executor_never_writes() {
    let directory = MemoryDirectory::new();
    let ops = vec![CreateOp {
        key: "site0".into(),
        payload: payload(json!({"name": "site0", "slug": "site0"})),
    }];
    let mut dry = SyncStats::new("sites");
    let mut real = SyncStats::new("sites");

    let previews = BatchExecutor::new(true)
        .execute(&directory, &CreateTarget(EntityKind::Site), &ops, &mut dry)
        .await;
    assert!(directory.mutating_calls().is_empty());
    assert!(previews[0].as_ref().map(|p| p.is_placeholder()).unwrap_or(false));

    BatchExecutor::new(false)
        .execute(&directory, &CreateTarget(EntityKind::Site), &ops, &mut real)
        .await;
    assert_eq!(dry, real);
}
