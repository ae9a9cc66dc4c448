//! Per-operation counters and the outcome log.

use serde::Serialize;
use std::fmt;

use crate::change::SkipReason;

/// Outcome recorded for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Delete,
    Skip,
    AssignMac,
    Fail,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Skip => "skip",
            Action::AssignMac => "assign_mac",
            Action::Fail => "fail",
        };
        f.write_str(s)
    }
}

/// One line of the outcome log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatDetail {
    pub key: String,
    pub action: Action,
    pub message: String,
}

/// Counters only, for comparing runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatCounters {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub failed: u64,
    pub mac_assigned: u64,
}

/// Statistics for one entity sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Entity family (`interfaces`, `cables`, ...).
    pub entity: String,
    /// Number of records created.
    pub created: u64,
    /// Number of records updated.
    pub updated: u64,
    /// Number of records deleted.
    pub deleted: u64,
    /// Number of items left untouched.
    pub skipped: u64,
    /// Number of items whose mutation failed.
    pub failed: u64,
    /// Number of hardware addresses assigned.
    pub mac_assigned: u64,
    /// Per-item outcomes, in the order they were recorded.
    pub details: Vec<StatDetail>,
}

impl SyncStats {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            ..Default::default()
        }
    }

    /// Records a successful mutation.
    pub fn record(&mut self, action: Action, key: impl Into<String>, message: impl Into<String>) {
        match action {
            Action::Create => self.created += 1,
            Action::Update => self.updated += 1,
            Action::Delete => self.deleted += 1,
            Action::Skip => self.skipped += 1,
            Action::AssignMac => self.mac_assigned += 1,
            Action::Fail => self.failed += 1,
        }
        self.details.push(StatDetail {
            key: key.into(),
            action,
            message: message.into(),
        });
    }

    pub fn record_skip(&mut self, key: impl Into<String>, reason: &SkipReason) {
        self.record(Action::Skip, key, reason.to_string());
    }

    /// Records a failed mutation; `attempted` names what was tried.
    pub fn record_failure(
        &mut self,
        key: impl Into<String>,
        attempted: Action,
        error: impl fmt::Display,
    ) {
        self.record(Action::Fail, key, format!("{} failed: {}", attempted, error));
    }

    pub fn counters(&self) -> StatCounters {
        StatCounters {
            created: self.created,
            updated: self.updated,
            deleted: self.deleted,
            skipped: self.skipped,
            failed: self.failed,
            mac_assigned: self.mac_assigned,
        }
    }

    /// Returns the details recorded for one key.
    pub fn details_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a StatDetail> + 'a {
        self.details.iter().filter(move |d| d.key == key)
    }

    /// Returns true if nothing was written and nothing failed.
    pub fn is_noop(&self) -> bool {
        self.created == 0
            && self.updated == 0
            && self.deleted == 0
            && self.failed == 0
            && self.mac_assigned == 0
    }

    /// Adds another run's counters and details to this one.
    pub fn merge(&mut self, other: SyncStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.mac_assigned += other.mac_assigned;
        self.details.extend(other.details);
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: created={} updated={} deleted={} skipped={} failed={} mac={}",
            self.entity,
            self.created,
            self.updated,
            self.deleted,
            self.skipped,
            self.failed,
            self.mac_assigned
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_and_merge() {
        let mut a = SyncStats::new("interfaces");
        a.record(Action::Create, "Gi0/1", "created");
        a.record_skip("Gi0/2", &SkipReason::NoChanges);

        let mut b = SyncStats::new("interfaces");
        b.record_failure("Gi0/3", Action::Update, "type is required");

        a.merge(b);
        assert_eq!(
            a.counters(),
            StatCounters {
                created: 1,
                skipped: 1,
                failed: 1,
                ..Default::default()
            }
        );
        assert_eq!(
            a.details_for("Gi0/3").next().map(|d| d.message.as_str()),
            Some("update failed: type is required")
        );
        assert_eq!(
            a.summary(),
            "interfaces: created=1 updated=0 deleted=0 skipped=1 failed=1 mac=0"
        );
    }

    #[test]
    fn test_is_noop() {
        let mut s = SyncStats::new("vlans");
        s.record_skip("10", &SkipReason::NoChanges);
        assert!(s.is_noop());
        s.record(Action::AssignMac, "Gi0/1", "");
        assert!(!s.is_noop());
    }
}
