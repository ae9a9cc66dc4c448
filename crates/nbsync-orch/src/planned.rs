//! Local records whose desired state is already a directory payload.
//!
//! Devices, IP addresses, VLANs, inventory items and cables carry no
//! derivation beyond building the payload, so they share one record type
//! and one field source.

use nbsync_core::{ref_id_of, FieldChange, FieldSource, FieldValue, LocalRecord, Payload, RemoteRecord};
use serde_json::Value;

/// A desired record: its natural key and the payload it should have.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRecord {
    pub key: String,
    pub attrs: Payload,
}

impl PlannedRecord {
    pub fn new(key: impl Into<String>, attrs: Payload) -> Self {
        Self {
            key: key.into(),
            attrs,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attrs.get(field)
    }

    /// The payload subset covering the detected changes.
    pub fn changes(&self, changes: &[FieldChange]) -> Payload {
        changes
            .iter()
            .filter_map(|c| {
                self.attrs
                    .get(&c.field)
                    .map(|v| (c.field.clone(), v.clone()))
            })
            .collect()
    }
}

impl LocalRecord for PlannedRecord {
    fn key(&self) -> String {
        self.key.clone()
    }
}

/// Field source over payloads.
///
/// Fields listed in `refs` are references and compare by record id; every
/// other field compares by its scalar value, reading choice objects
/// (`{"value": .., "label": ..}`) by their value.
pub struct PayloadSource<F> {
    refs: &'static [&'static str],
    key_of: F,
}

impl<F> PayloadSource<F>
where
    F: Fn(&RemoteRecord) -> Option<String>,
{
    pub fn new(refs: &'static [&'static str], key_of: F) -> Self {
        Self { refs, key_of }
    }

    fn read(&self, field: &str, value: &Value) -> Option<FieldValue> {
        if self.refs.contains(&field) {
            return match value {
                Value::Null => Some(FieldValue::Null),
                v => ref_id_of(v).map(FieldValue::Ref),
            };
        }
        scalar(value)
    }
}

fn scalar(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null => Some(FieldValue::Null),
        Value::String(s) => Some(FieldValue::text(s.as_str())),
        Value::Bool(b) => Some(FieldValue::Bool(*b)),
        Value::Number(n) => n.as_i64().map(FieldValue::Int),
        Value::Object(map) => map.get("value").and_then(scalar),
        Value::Array(_) => None,
    }
}

impl<F> FieldSource<PlannedRecord> for PayloadSource<F>
where
    F: Fn(&RemoteRecord) -> Option<String>,
{
    fn remote_key(&self, remote: &RemoteRecord) -> Option<String> {
        (self.key_of)(remote)
    }

    fn local_value(&self, local: &PlannedRecord, field: &str) -> Option<FieldValue> {
        local.get(field).and_then(|v| self.read(field, v))
    }

    fn remote_value(&self, remote: &RemoteRecord, field: &str) -> Option<FieldValue> {
        remote.get(field).and_then(|v| self.read(field, v))
    }
}
