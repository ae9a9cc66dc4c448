//! Change model: what a comparison decided for each natural key.

use nbsync_types::VlanSet;
use serde::Serialize;
use std::fmt;

use crate::record::{EntityKind, RecordId, RemoteRecord};

/// What should happen to one natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    Skip,
}

/// A normalized, comparable attribute value.
///
/// `Null` means the attribute is explicitly empty on that side. An absent
/// value is represented by `Option::None` at the call site and never compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Text(String),
    Int(i64),
    Bool(bool),
    Vlans(VlanSet),
    Ref(RecordId),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    /// Returns `Null` for `None`, `Text` otherwise.
    pub fn opt_text(s: Option<impl Into<String>>) -> Self {
        s.map(|s| FieldValue::Text(s.into()))
            .unwrap_or(FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_vlans(&self) -> Option<&VlanSet> {
        match self {
            FieldValue::Vlans(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Text(s) => write!(f, "{:?}", s),
            FieldValue::Int(n) => write!(f, "{}", n),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Vlans(v) => write!(f, "[{}]", v),
            FieldValue::Ref(id) => write!(f, "#{}", id),
        }
    }
}

/// One detected discrepancy between the remote and local value of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    /// Current remote value; `None` if the remote record lacks the field.
    pub old: Option<FieldValue>,
    /// Desired local value.
    pub new: FieldValue,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, old: Option<FieldValue>, new: FieldValue) -> Self {
        Self {
            field: field.into(),
            old,
            new,
        }
    }
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.old {
            Some(old) => write!(f, "{}: {} -> {}", self.field, old, self.new),
            None => write!(f, "{}: (unset) -> {}", self.field, self.new),
        }
    }
}

/// Why an item was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// The key matched an exclude pattern.
    Excluded,
    /// Local and remote agree on every compared field.
    NoChanges,
    /// The key exists only remotely and cleanup is disabled.
    RemoteOnly,
    /// A required reference could not be found or created.
    Unresolved(String),
    /// The local record carries too little data to act on.
    NotActionable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Excluded => f.write_str("excluded"),
            SkipReason::NoChanges => f.write_str("no changes"),
            SkipReason::RemoteOnly => f.write_str("remote only"),
            SkipReason::Unresolved(what) => write!(f, "unresolved {}", what),
            SkipReason::NotActionable(why) => write!(f, "not actionable: {}", why),
        }
    }
}

/// The decision for one natural key.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeItem<L> {
    pub key: String,
    pub kind: ChangeKind,
    pub local: Option<L>,
    pub remote: Option<RemoteRecord>,
    pub changes: Vec<FieldChange>,
    pub skip_reason: Option<SkipReason>,
}

impl<L> ChangeItem<L> {
    pub fn create(key: impl Into<String>, local: L) -> Self {
        Self {
            key: key.into(),
            kind: ChangeKind::Create,
            local: Some(local),
            remote: None,
            changes: Vec::new(),
            skip_reason: None,
        }
    }

    pub fn update(
        key: impl Into<String>,
        local: L,
        remote: RemoteRecord,
        changes: Vec<FieldChange>,
    ) -> Self {
        Self {
            key: key.into(),
            kind: ChangeKind::Update,
            local: Some(local),
            remote: Some(remote),
            changes,
            skip_reason: None,
        }
    }

    pub fn delete(key: impl Into<String>, remote: RemoteRecord) -> Self {
        Self {
            key: key.into(),
            kind: ChangeKind::Delete,
            local: None,
            remote: Some(remote),
            changes: Vec::new(),
            skip_reason: None,
        }
    }

    pub fn skip(
        key: impl Into<String>,
        local: Option<L>,
        remote: Option<RemoteRecord>,
        reason: SkipReason,
    ) -> Self {
        Self {
            key: key.into(),
            kind: ChangeKind::Skip,
            local,
            remote,
            changes: Vec::new(),
            skip_reason: Some(reason),
        }
    }

    /// Returns the change detected for a field, if any.
    pub fn change(&self, field: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    /// Returns true if the field was detected as changed.
    pub fn changed(&self, field: &str) -> bool {
        self.change(field).is_some()
    }

    /// Returns the remote id, if the item has a remote side.
    pub fn remote_id(&self) -> Option<RecordId> {
        self.remote.as_ref().map(RemoteRecord::id)
    }
}

/// The result of comparing one entity family.
///
/// Every natural key seen on either side lands in exactly one list.
#[derive(Debug, Clone, PartialEq)]
pub struct Diff<L> {
    pub entity: EntityKind,
    pub to_create: Vec<ChangeItem<L>>,
    pub to_update: Vec<ChangeItem<L>>,
    pub to_delete: Vec<ChangeItem<L>>,
    pub to_skip: Vec<ChangeItem<L>>,
}

impl<L> Diff<L> {
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
            to_skip: Vec::new(),
        }
    }

    /// Files an item into the list matching its kind.
    pub fn push(&mut self, item: ChangeItem<L>) {
        match item.kind {
            ChangeKind::Create => self.to_create.push(item),
            ChangeKind::Update => self.to_update.push(item),
            ChangeKind::Delete => self.to_delete.push(item),
            ChangeKind::Skip => self.to_skip.push(item),
        }
    }

    pub fn total(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len() + self.to_skip.len()
    }

    /// Returns true if anything would be written.
    pub fn has_changes(&self) -> bool {
        !(self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty())
    }

    /// Iterates every item across the four lists.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeItem<L>> {
        self.to_create
            .iter()
            .chain(self.to_update.iter())
            .chain(self.to_delete.iter())
            .chain(self.to_skip.iter())
    }

    /// Finds the item for a key in any list.
    pub fn find(&self, key: &str) -> Option<&ChangeItem<L>> {
        self.iter().find(|i| i.key == key)
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: create={} update={} delete={} skip={}",
            self.entity,
            self.to_create.len(),
            self.to_update.len(),
            self.to_delete.len(),
            self.to_skip.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_diff_push_files_by_kind() {
        let mut diff: Diff<()> = Diff::new(EntityKind::Interface);
        diff.push(ChangeItem::create("Gi0/1", ()));
        diff.push(ChangeItem::skip("Gi0/2", Some(()), None, SkipReason::Excluded));

        assert_eq!(diff.total(), 2);
        assert!(diff.has_changes());
        assert_eq!(diff.find("Gi0/2").map(|i| i.kind), Some(ChangeKind::Skip));
        assert_eq!(diff.summary(), "interface: create=1 update=0 delete=0 skip=1");
    }

    #[test]
    fn test_display_forms() {
        let change = FieldChange::new(
            "description",
            Some(FieldValue::text("stale")),
            FieldValue::text("old"),
        );
        assert_eq!(change.to_string(), "description: \"stale\" -> \"old\"");
        assert_eq!(SkipReason::NoChanges.to_string(), "no changes");
        assert_eq!(
            SkipReason::Unresolved("parent LAG Po1".into()).to_string(),
            "unresolved parent LAG Po1"
        );
    }
}
