//! The diff engine: local records against remote records.
//!
//! Comparison is pure and never fails. Values a [`FieldSource`] cannot read
//! (malformed local data, attributes missing remotely) are absent and do not
//! produce changes.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::change::{ChangeItem, Diff, FieldChange, FieldValue, SkipReason};
use crate::record::{EntityKind, RemoteRecord};

/// A record collected from a device, identified by a natural key.
pub trait LocalRecord {
    fn key(&self) -> String;
}

/// Reads normalized field values from both sides of a comparison.
pub trait FieldSource<L> {
    /// Natural key of a remote record; `None` if it has none.
    fn remote_key(&self, remote: &RemoteRecord) -> Option<String>;

    /// Desired value. `None` means the local side says nothing about the
    /// field and it is not compared.
    fn local_value(&self, local: &L, field: &str) -> Option<FieldValue>;

    /// Current value. `None` means the remote record lacks the attribute.
    fn remote_value(&self, remote: &RemoteRecord, field: &str) -> Option<FieldValue>;
}

/// Compiled exclude patterns.
///
/// Patterns are regular expressions searched anywhere in the key; anchor
/// them (`^Vlan1$`) for exact matches.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<Regex>,
}

impl ExcludeSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, key: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(key))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// What to compare and whether remote-only records are deleted.
#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub entity: EntityKind,
    pub fields: Vec<String>,
    pub excludes: ExcludeSet,
    pub cleanup: bool,
}

impl CompareOptions {
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            fields: Vec::new(),
            excludes: ExcludeSet::default(),
            cleanup: false,
        }
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn excludes(mut self, excludes: ExcludeSet) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }
}

/// Returns the changes between one local and one remote record.
pub fn field_changes<L>(
    local: &L,
    remote: &RemoteRecord,
    source: &dyn FieldSource<L>,
    fields: &[String],
) -> Vec<FieldChange> {
    fields
        .iter()
        .filter_map(|field| {
            let desired = source.local_value(local, field)?;
            let current = source.remote_value(remote, field);
            let differs = match &current {
                Some(current) => *current != desired,
                None => !desired.is_null(),
            };
            differs.then(|| FieldChange::new(field.as_str(), current, desired))
        })
        .collect()
}

/// Compares local records against remote records.
///
/// Locals sharing a key collapse to the last occurrence; remotes sharing a
/// key collapse to the first. Every key from either side lands in exactly one
/// list of the returned diff. Remote-only keys become deletes when cleanup is
/// enabled and `RemoteOnly` skips otherwise.
pub fn compare<L: LocalRecord>(
    local: Vec<L>,
    remote: Vec<RemoteRecord>,
    source: &dyn FieldSource<L>,
    options: &CompareOptions,
) -> Diff<L> {
    let mut diff = Diff::new(options.entity);

    let mut local_order: Vec<String> = Vec::with_capacity(local.len());
    let mut local_by_key: HashMap<String, L> = HashMap::with_capacity(local.len());
    for record in local {
        let key = record.key();
        if local_by_key.insert(key.clone(), record).is_some() {
            debug!(entity = %options.entity, key = %key, "duplicate local key, keeping last");
        } else {
            local_order.push(key);
        }
    }

    let mut remote_order: Vec<String> = Vec::with_capacity(remote.len());
    let mut remote_by_key: HashMap<String, RemoteRecord> = HashMap::with_capacity(remote.len());
    for record in remote {
        let Some(key) = source.remote_key(&record) else {
            debug!(entity = %options.entity, id = record.id(), "remote record without key");
            continue;
        };
        if remote_by_key.contains_key(&key) {
            debug!(entity = %options.entity, key = %key, id = record.id(), "duplicate remote key, keeping first");
            continue;
        }
        remote_order.push(key.clone());
        remote_by_key.insert(key, record);
    }

    let mut visited: HashSet<String> = HashSet::with_capacity(local_order.len());
    for key in local_order {
        let Some(record) = local_by_key.remove(&key) else {
            continue;
        };
        visited.insert(key.clone());
        let remote = remote_by_key.remove(&key);

        if options.excludes.is_excluded(&key) {
            diff.push(ChangeItem::skip(key, Some(record), remote, SkipReason::Excluded));
            continue;
        }

        match remote {
            None => diff.push(ChangeItem::create(key, record)),
            Some(remote) => {
                let changes = field_changes(&record, &remote, source, &options.fields);
                if changes.is_empty() {
                    diff.push(ChangeItem::skip(
                        key,
                        Some(record),
                        Some(remote),
                        SkipReason::NoChanges,
                    ));
                } else {
                    diff.push(ChangeItem::update(key, record, remote, changes));
                }
            }
        }
    }

    for key in remote_order {
        if visited.contains(&key) {
            continue;
        }
        let Some(remote) = remote_by_key.remove(&key) else {
            continue;
        };
        let item = if options.excludes.is_excluded(&key) {
            ChangeItem::skip(key, None, Some(remote), SkipReason::Excluded)
        } else if options.cleanup {
            ChangeItem::delete(key, remote)
        } else {
            ChangeItem::skip(key, None, Some(remote), SkipReason::RemoteOnly)
        };
        diff.push(item);
    }

    debug!(summary = %diff.summary(), "comparison complete");
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeKind;
    use crate::record::Payload;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    #[derive(Debug, Clone, PartialEq)]
    struct Port {
        name: String,
        description: Option<String>,
    }

    impl LocalRecord for Port {
        fn key(&self) -> String {
            self.name.clone()
        }
    }

    struct PortSource;

    impl FieldSource<Port> for PortSource {
        fn remote_key(&self, remote: &RemoteRecord) -> Option<String> {
            remote.name().map(str::to_string)
        }

        fn local_value(&self, local: &Port, field: &str) -> Option<FieldValue> {
            match field {
                "description" => local.description.clone().map(FieldValue::Text),
                _ => None,
            }
        }

        fn remote_value(&self, remote: &RemoteRecord, field: &str) -> Option<FieldValue> {
            match remote.get(field)? {
                Value::String(s) => Some(FieldValue::text(s.as_str())),
                Value::Null => Some(FieldValue::Null),
                _ => None,
            }
        }
    }

    fn port(name: &str, description: &str) -> Port {
        Port {
            name: name.into(),
            description: Some(description.into()),
        }
    }

    fn remote(id: u64, name: &str, description: &str) -> RemoteRecord {
        let mut attrs = Payload::new();
        attrs.insert("name".into(), json!(name));
        attrs.insert("description".into(), json!(description));
        RemoteRecord::new(id, attrs)
    }

    fn options() -> CompareOptions {
        CompareOptions::new(EntityKind::Interface).fields(["description"])
    }

    #[test]
    fn test_identical_records_skip() {
        let diff = compare(
            vec![port("Gi0/1", "old")],
            vec![remote(1, "Gi0/1", "old")],
            &PortSource,
            &options(),
        );
        assert_eq!(diff.to_skip.len(), 1);
        assert_eq!(diff.to_skip[0].skip_reason, Some(SkipReason::NoChanges));
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_changed_description_updates() {
        let diff = compare(
            vec![port("Gi0/1", "old")],
            vec![remote(1, "Gi0/1", "stale")],
            &PortSource,
            &options(),
        );
        assert_eq!(diff.to_update.len(), 1);
        assert_eq!(
            diff.to_update[0].changes,
            vec![FieldChange::new(
                "description",
                Some(FieldValue::text("stale")),
                FieldValue::text("old")
            )]
        );
    }

    #[test]
    fn test_empty_description_is_compared() {
        let diff = compare(
            vec![port("Gi0/1", "")],
            vec![remote(1, "Gi0/1", "uplink")],
            &PortSource,
            &options(),
        );
        assert_eq!(diff.to_update.len(), 1);
    }

    #[test]
    fn test_absent_local_value_is_not_compared() {
        let local = Port {
            name: "Gi0/1".into(),
            description: None,
        };
        let diff = compare(vec![local], vec![remote(1, "Gi0/1", "x")], &PortSource, &options());
        assert_eq!(diff.to_skip.len(), 1);
    }

    #[test]
    fn test_remote_only_depends_on_cleanup() {
        let locals = vec![port("Gi0/1", "a")];
        let remotes = vec![remote(1, "Gi0/1", "a"), remote(2, "Gi0/9", "gone")];

        let diff = compare(locals.clone(), remotes.clone(), &PortSource, &options());
        assert_eq!(diff.to_delete.len(), 0);
        assert_eq!(diff.find("Gi0/9").and_then(|i| i.skip_reason.clone()), Some(SkipReason::RemoteOnly));

        let diff = compare(locals, remotes, &PortSource, &options().cleanup(true));
        assert_eq!(diff.to_delete.len(), 1);
        assert_eq!(diff.to_delete[0].remote_id(), Some(2));
    }

    #[test]
    fn test_excluded_keys_skip_on_both_sides() {
        let excludes = ExcludeSet::new(&["^Vlan", "mgmt"]).unwrap();
        let diff = compare(
            vec![port("Vlan10", "a"), port("mgmt0", "b")],
            vec![remote(1, "Vlan20", "x")],
            &PortSource,
            &options().excludes(excludes).cleanup(true),
        );
        assert_eq!(diff.to_skip.len(), 3);
        assert!(diff.to_skip.iter().all(|i| i.skip_reason == Some(SkipReason::Excluded)));
    }

    #[test]
    fn test_duplicate_local_keys_keep_last() {
        let diff = compare(
            vec![port("Gi0/1", "first"), port("Gi0/1", "second")],
            vec![],
            &PortSource,
            &options(),
        );
        assert_eq!(diff.to_create.len(), 1);
        assert_eq!(
            diff.to_create[0].local.as_ref().and_then(|p| p.description.clone()),
            Some("second".to_string())
        );
    }

    #[test]
    fn test_partition_completeness() {
        let locals: Vec<Port> = (0..6).map(|i| port(&format!("Gi0/{}", i), "d")).collect();
        let remotes: Vec<RemoteRecord> = (3..9)
            .map(|i| remote(i, &format!("Gi0/{}", i), if i % 2 == 0 { "d" } else { "x" }))
            .collect();
        let excludes = ExcludeSet::new(&["Gi0/8"]).unwrap();

        for cleanup in [false, true] {
            let diff = compare(
                locals.clone(),
                remotes.clone(),
                &PortSource,
                &options().excludes(excludes.clone()).cleanup(cleanup),
            );
            let mut keys: Vec<String> = diff.iter().map(|i| i.key.clone()).collect();
            keys.sort();
            let mut expected: Vec<String> = (0..9).map(|i| format!("Gi0/{}", i)).collect();
            expected.sort();
            assert_eq!(keys, expected);
            assert_eq!(diff.to_delete.is_empty(), !cleanup);
        }
    }

    #[test]
    fn test_idempotent_after_apply() {
        let locals = vec![port("Gi0/1", "a"), port("Gi0/2", "b")];
        let diff = compare(locals.clone(), vec![remote(1, "Gi0/1", "z")], &PortSource, &options());
        assert_eq!(diff.to_create.len(), 1);

        let applied: Vec<RemoteRecord> = locals
            .iter()
            .enumerate()
            .map(|(i, p)| remote(i as u64 + 1, &p.name, p.description.as_deref().unwrap_or("")))
            .collect();
        let again = compare(locals, applied, &PortSource, &options().cleanup(true));
        assert!(again.iter().all(|i| i.kind == ChangeKind::Skip));
    }
}
