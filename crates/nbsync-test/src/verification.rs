//! Verification helpers for reconciliation tests
//!
//! Provides assertion helpers over directory state and run reports

use nbsync_core::{Action, CallOp, EntityKind, MemoryDirectory, RemoteRecord, StatCounters};
use nbsync_orch::DeviceReport;
use serde_json::Value;
use thiserror::Error;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected {kind} '{name}' not found in directory")]
    RecordNotFound { kind: EntityKind, name: String },

    #[error("Value mismatch for {kind} '{name}' field {field}: expected {expected}, got {actual}")]
    ValueMismatch {
        kind: EntityKind,
        name: String,
        field: String,
        expected: Value,
        actual: Value,
    },

    #[error("Expected {expected} {kind} records, found {actual}")]
    CountMismatch {
        kind: EntityKind,
        expected: usize,
        actual: usize,
    },

    #[error("Expected no writes, found {0:?}")]
    UnexpectedWrites(Vec<String>),

    #[error("Report for '{device}' {entity}: expected {expected:?}, got {actual:?}")]
    CounterMismatch {
        device: String,
        entity: String,
        expected: StatCounters,
        actual: StatCounters,
    },

    #[error("Report for '{device}' has failures: {details:?}")]
    Failures { device: String, details: Vec<String> },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Directory state verifier
pub struct DirectoryVerifier<'a> {
    directory: &'a MemoryDirectory,
}

impl<'a> DirectoryVerifier<'a> {
    pub fn new(directory: &'a MemoryDirectory) -> Self {
        Self { directory }
    }

    /// Verify that a named record exists
    pub fn assert_exists(&self, kind: EntityKind, name: &str) -> VerifyResult<RemoteRecord> {
        self.directory
            .find_by_name(kind, name)
            .ok_or_else(|| VerificationError::RecordNotFound {
                kind,
                name: name.to_string(),
            })
    }

    /// Verify that a named record does not exist
    pub fn assert_absent(&self, kind: EntityKind, name: &str) -> VerifyResult<()> {
        match self.directory.find_by_name(kind, name) {
            None => Ok(()),
            Some(_) => Err(VerificationError::CountMismatch {
                kind,
                expected: 0,
                actual: 1,
            }),
        }
    }

    /// Verify one field of a named record. A missing field reads as null.
    pub fn assert_field(
        &self,
        kind: EntityKind,
        name: &str,
        field: &str,
        expected: impl Into<Value>,
    ) -> VerifyResult<()> {
        let record = self.assert_exists(kind, name)?;
        let expected = expected.into();
        let actual = record.get(field).cloned().unwrap_or(Value::Null);
        if actual == expected {
            Ok(())
        } else {
            Err(VerificationError::ValueMismatch {
                kind,
                name: name.to_string(),
                field: field.to_string(),
                expected,
                actual,
            })
        }
    }

    /// Verify the number of records of a kind
    pub fn assert_count(&self, kind: EntityKind, expected: usize) -> VerifyResult<()> {
        let actual = self.directory.len(kind);
        if actual != expected {
            return Err(VerificationError::CountMismatch {
                kind,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify that no mutating call reached the directory
    pub fn assert_no_writes(&self) -> VerifyResult<()> {
        let writes = self.directory.mutating_calls();
        if writes.is_empty() {
            return Ok(());
        }
        Err(VerificationError::UnexpectedWrites(
            writes
                .iter()
                .map(|c| format!("{:?} {} {:?}", c.op, c.kind, c.labels))
                .collect(),
        ))
    }

    /// Labels of each call of `op` on `kind`, in call order
    pub fn call_labels(&self, op: CallOp, kind: EntityKind) -> Vec<Vec<String>> {
        self.directory
            .calls()
            .into_iter()
            .filter(|c| c.op == op && c.kind == kind)
            .map(|c| c.labels)
            .collect()
    }
}

/// Run report verifier
pub struct ReportVerifier<'a> {
    reports: &'a [DeviceReport],
}

impl<'a> ReportVerifier<'a> {
    pub fn new(reports: &'a [DeviceReport]) -> Self {
        Self { reports }
    }

    fn report(&self, device: &str) -> VerifyResult<&'a DeviceReport> {
        self.reports
            .iter()
            .find(|r| r.device == device)
            .ok_or_else(|| VerificationError::RecordNotFound {
                kind: EntityKind::Device,
                name: device.to_string(),
            })
    }

    /// Verify the counters of one entity of one device
    pub fn assert_counters(
        &self,
        device: &str,
        entity: &str,
        expected: StatCounters,
    ) -> VerifyResult<()> {
        let report = self.report(device)?;
        let actual = report
            .entity(entity)
            .map(|s| s.counters())
            .unwrap_or_default();
        if actual != expected {
            return Err(VerificationError::CounterMismatch {
                device: device.to_string(),
                entity: entity.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify that no report carries a failure
    pub fn assert_no_failures(&self) -> VerifyResult<()> {
        for report in self.reports {
            if !report.has_failures() {
                continue;
            }
            let details = report
                .entities
                .iter()
                .flat_map(|s| s.details.iter())
                .filter(|d| d.action == Action::Fail)
                .map(|d| format!("{}: {}", d.key, d.message))
                .collect();
            return Err(VerificationError::Failures {
                device: report.device.clone(),
                details,
            });
        }
        Ok(())
    }

    /// Verify that no report created, updated or deleted anything
    pub fn assert_noop(&self) -> VerifyResult<()> {
        for report in self.reports {
            let totals = report.totals();
            let expected = StatCounters {
                skipped: totals.skipped,
                ..Default::default()
            };
            if totals != expected {
                return Err(VerificationError::CounterMismatch {
                    device: report.device.clone(),
                    entity: "*".into(),
                    expected,
                    actual: totals,
                });
            }
        }
        Ok(())
    }
}
