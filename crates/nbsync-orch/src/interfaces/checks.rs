//! The eleven per-field update checks.
//!
//! Each check compares one field of the desired state against the directory
//! record and yields at most one payload entry and one note. The same checks
//! build create payloads, run against an empty record.

use nbsync_core::{FieldChange, FieldSource, FieldValue, Payload, RecordId, RemoteRecord};
use nbsync_types::MacAddress;
use serde_json::Value;
use std::collections::HashMap;

use super::fields::{
    DesiredInterface, InterfaceFieldSource, DESCRIPTION, DUPLEX, ENABLED, LAG, MAC, MODE, MTU,
    SPEED, TAGGED_VLANS, TYPE, UNTAGGED_VLAN,
};
use crate::config::MacPolicy;

/// Lookups the checks need, all served from the run cache.
pub struct CheckContext<'a> {
    pub source: &'a InterfaceFieldSource<'a>,
    /// Fields enabled for sync.
    pub fields: &'a [String],
    /// VLAN tag → record id for the device's site, then global VLANs.
    pub vlan_ids: &'a HashMap<u16, RecordId>,
    /// Canonical LAG name → record id on this device.
    pub lag_ids: &'a HashMap<String, RecordId>,
    pub mac_policy: MacPolicy,
}

/// What one check decided.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Write `value` to `field`.
    Set {
        field: &'static str,
        value: Value,
        note: String,
    },
    /// Assign a hardware address through the separate address entity.
    Mac { mac: MacAddress, note: String },
    /// The field differs but its target could not be resolved.
    Unresolved(String),
    /// The parent LAG could not be resolved; the interface cannot be created.
    MissingParent(String),
}

/// The combined result of all checks for one interface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfacePlan {
    pub changes: Payload,
    pub notes: Vec<String>,
    pub mac: Option<MacAddress>,
    pub unresolved: Vec<String>,
    pub missing_parent: Option<String>,
}

impl InterfacePlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.mac.is_none()
    }
}

type Check = fn(&CheckContext<'_>, &DesiredInterface, &RemoteRecord) -> Option<CheckOutcome>;

/// Every check, in the order their notes are reported.
pub const CHECKS: [Check; 11] = [
    check_type,
    check_description,
    check_enabled,
    check_mac,
    check_mtu,
    check_speed,
    check_duplex,
    check_mode,
    check_untagged_vlan,
    check_tagged_vlans,
    check_lag,
];

/// Runs every check.
pub fn plan(ctx: &CheckContext<'_>, desired: &DesiredInterface, remote: &RemoteRecord) -> InterfacePlan {
    let mut plan = InterfacePlan::default();
    for check in CHECKS {
        match check(ctx, desired, remote) {
            Some(CheckOutcome::Set { field, value, note }) => {
                plan.changes.insert(field.to_string(), value);
                plan.notes.push(note);
            }
            Some(CheckOutcome::Mac { mac, note }) => {
                plan.mac = Some(mac);
                plan.notes.push(note);
            }
            Some(CheckOutcome::Unresolved(note)) => plan.unresolved.push(note),
            Some(CheckOutcome::MissingParent(note)) => {
                plan.unresolved.push(note.clone());
                plan.missing_parent = Some(note);
            }
            None => {}
        }
    }
    plan
}

/// Returns the current and desired value if the field is enabled and differs.
fn differs(
    ctx: &CheckContext<'_>,
    desired: &DesiredInterface,
    remote: &RemoteRecord,
    field: &str,
) -> Option<(Option<FieldValue>, FieldValue)> {
    if !ctx.fields.iter().any(|f| f == field) {
        return None;
    }
    let new = ctx.source.local_value(desired, field)?;
    let old = ctx.source.remote_value(remote, field);
    let changed = match &old {
        Some(old) => *old != new,
        None => !new.is_null(),
    };
    changed.then_some((old, new))
}

fn set(field: &'static str, old: Option<FieldValue>, new: FieldValue, value: Value) -> Option<CheckOutcome> {
    Some(CheckOutcome::Set {
        field,
        value,
        note: FieldChange::new(field, old, new).to_string(),
    })
}

fn scalar(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Text(s) => Value::from(s.as_str()),
        FieldValue::Int(n) => Value::from(*n),
        FieldValue::Bool(b) => Value::from(*b),
        FieldValue::Ref(id) => Value::from(*id),
        FieldValue::Vlans(v) => Value::from(v.iter().collect::<Vec<u16>>()),
    }
}

fn simple(
    field: &'static str,
    ctx: &CheckContext<'_>,
    desired: &DesiredInterface,
    remote: &RemoteRecord,
) -> Option<CheckOutcome> {
    let (old, new) = differs(ctx, desired, remote, field)?;
    let value = scalar(&new);
    set(field, old, new, value)
}

pub fn check_type(ctx: &CheckContext<'_>, d: &DesiredInterface, r: &RemoteRecord) -> Option<CheckOutcome> {
    simple(TYPE, ctx, d, r)
}

pub fn check_description(ctx: &CheckContext<'_>, d: &DesiredInterface, r: &RemoteRecord) -> Option<CheckOutcome> {
    simple(DESCRIPTION, ctx, d, r)
}

pub fn check_enabled(ctx: &CheckContext<'_>, d: &DesiredInterface, r: &RemoteRecord) -> Option<CheckOutcome> {
    simple(ENABLED, ctx, d, r)
}

/// Hardware address, subject to the assignment policy. Not part of the
/// compared field set.
pub fn check_mac(ctx: &CheckContext<'_>, d: &DesiredInterface, r: &RemoteRecord) -> Option<CheckOutcome> {
    let allowed = match ctx.mac_policy {
        MacPolicy::Always => true,
        MacPolicy::WithIp => d.has_ip,
        MacPolicy::Never => false,
    };
    if !allowed {
        return None;
    }
    let mac = d.mac?;
    let new = ctx.source.local_value(d, MAC)?;
    let old = ctx.source.remote_value(r, MAC);
    if old.as_ref() == Some(&new) {
        return None;
    }
    Some(CheckOutcome::Mac {
        mac,
        note: FieldChange::new(MAC, old, new).to_string(),
    })
}

pub fn check_mtu(ctx: &CheckContext<'_>, d: &DesiredInterface, r: &RemoteRecord) -> Option<CheckOutcome> {
    simple(MTU, ctx, d, r)
}

pub fn check_speed(ctx: &CheckContext<'_>, d: &DesiredInterface, r: &RemoteRecord) -> Option<CheckOutcome> {
    simple(SPEED, ctx, d, r)
}

pub fn check_duplex(ctx: &CheckContext<'_>, d: &DesiredInterface, r: &RemoteRecord) -> Option<CheckOutcome> {
    simple(DUPLEX, ctx, d, r)
}

pub fn check_mode(ctx: &CheckContext<'_>, d: &DesiredInterface, r: &RemoteRecord) -> Option<CheckOutcome> {
    simple(MODE, ctx, d, r)
}

pub fn check_untagged_vlan(ctx: &CheckContext<'_>, d: &DesiredInterface, r: &RemoteRecord) -> Option<CheckOutcome> {
    let (old, new) = differs(ctx, d, r, UNTAGGED_VLAN)?;
    let value = match &new {
        FieldValue::Int(tag) => {
            let tag = u16::try_from(*tag).ok()?;
            match ctx.vlan_ids.get(&tag) {
                Some(id) => Value::from(*id),
                None => {
                    return Some(CheckOutcome::Unresolved(format!(
                        "untagged VLAN {} not found",
                        tag
                    )))
                }
            }
        }
        _ => Value::Null,
    };
    set(UNTAGGED_VLAN, old, new, value)
}

pub fn check_tagged_vlans(ctx: &CheckContext<'_>, d: &DesiredInterface, r: &RemoteRecord) -> Option<CheckOutcome> {
    let (old, new) = differs(ctx, d, r, TAGGED_VLANS)?;
    let tags = new.as_vlans()?;
    let mut ids = Vec::with_capacity(tags.len());
    let mut missing = Vec::new();
    for tag in tags.iter() {
        match ctx.vlan_ids.get(&tag) {
            Some(id) => ids.push(Value::from(*id)),
            None => missing.push(tag),
        }
    }
    if !missing.is_empty() {
        let missing: nbsync_types::VlanSet = missing.into_iter().collect();
        return Some(CheckOutcome::Unresolved(format!(
            "tagged VLANs {} not found",
            missing
        )));
    }
    set(TAGGED_VLANS, old, new, Value::Array(ids))
}

pub fn check_lag(ctx: &CheckContext<'_>, d: &DesiredInterface, r: &RemoteRecord) -> Option<CheckOutcome> {
    let (old, new) = differs(ctx, d, r, LAG)?;
    let value = match &new {
        FieldValue::Text(name) => match ctx.lag_ids.get(name) {
            Some(id) => Value::from(*id),
            None => return Some(CheckOutcome::MissingParent(format!("parent LAG {}", name))),
        },
        _ => Value::Null,
    };
    set(LAG, old, new, value)
}
