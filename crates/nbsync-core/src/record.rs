//! Remote directory records and lookup queries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::net::IpAddr;

/// Numeric identifier of a directory record.
pub type RecordId = u64;

/// Attribute map sent to or received from the directory.
pub type Payload = serde_json::Map<String, Value>;

/// Entity families stored in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Site,
    DeviceRole,
    Manufacturer,
    DeviceType,
    Platform,
    Tenant,
    Device,
    Interface,
    IpAddress,
    Vlan,
    Cable,
    InventoryItem,
    MacAddress,
}

impl EntityKind {
    /// Returns the snake_case name used in logs and reports.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Site => "site",
            EntityKind::DeviceRole => "device_role",
            EntityKind::Manufacturer => "manufacturer",
            EntityKind::DeviceType => "device_type",
            EntityKind::Platform => "platform",
            EntityKind::Tenant => "tenant",
            EntityKind::Device => "device",
            EntityKind::Interface => "interface",
            EntityKind::IpAddress => "ip_address",
            EntityKind::Vlan => "vlan",
            EntityKind::Cable => "cable",
            EntityKind::InventoryItem => "inventory_item",
            EntityKind::MacAddress => "mac_address",
        }
    }

    /// Returns true for reference entities that are resolved by slug.
    pub const fn is_reference(&self) -> bool {
        matches!(
            self,
            EntityKind::Site
                | EntityKind::DeviceRole
                | EntityKind::Manufacturer
                | EntityKind::DeviceType
                | EntityKind::Platform
                | EntityKind::Tenant
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record held by the remote directory.
///
/// The engine assumes nothing beyond a stable identifier and a map of named
/// attributes. Nested references may appear either as a bare id or as a brief
/// object carrying at least `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    id: RecordId,
    #[serde(flatten)]
    attrs: Payload,
}

impl RemoteRecord {
    /// Identifier used for records that only exist in a dry run.
    pub const PLACEHOLDER_ID: RecordId = 0;

    /// Creates a record from an id and its attributes.
    pub fn new(id: RecordId, mut attrs: Payload) -> Self {
        attrs.remove("id");
        Self { id, attrs }
    }

    /// Creates the stand-in returned when a mutation is previewed.
    pub fn placeholder(attrs: Payload) -> Self {
        Self::new(Self::PLACEHOLDER_ID, attrs)
    }

    /// Returns true if this record was never written to the directory.
    pub fn is_placeholder(&self) -> bool {
        self.id == Self::PLACEHOLDER_ID
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn attrs(&self) -> &Payload {
        &self.attrs
    }

    /// Returns a raw attribute.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attrs.get(field)
    }

    /// Returns a string attribute.
    pub fn str(&self, field: &str) -> Option<&str> {
        self.attrs.get(field).and_then(Value::as_str)
    }

    /// Returns an integer attribute.
    pub fn int(&self, field: &str) -> Option<i64> {
        self.attrs.get(field).and_then(Value::as_i64)
    }

    /// Returns a boolean attribute.
    pub fn bool(&self, field: &str) -> Option<bool> {
        self.attrs.get(field).and_then(Value::as_bool)
    }

    /// Returns the `name` attribute.
    pub fn name(&self) -> Option<&str> {
        self.str("name")
    }

    /// Returns the id of a nested reference, whether it is stored as a bare id
    /// or as a brief object.
    pub fn ref_id(&self, field: &str) -> Option<RecordId> {
        self.attrs.get(field).and_then(ref_id_of)
    }

    /// Returns the ids of a list of nested references.
    pub fn ref_ids(&self, field: &str) -> Vec<RecordId> {
        match self.attrs.get(field) {
            Some(Value::Array(items)) => items.iter().filter_map(ref_id_of).collect(),
            _ => Vec::new(),
        }
    }

    /// Returns true if the attribute is missing or null.
    pub fn is_null(&self, field: &str) -> bool {
        matches!(self.attrs.get(field), None | Some(Value::Null))
    }

    /// Applies changes in place, as an update would.
    pub fn merge(&mut self, changes: &Payload) {
        for (k, v) in changes {
            if k != "id" {
                self.attrs.insert(k.clone(), v.clone());
            }
        }
    }
}

/// Extracts a record id from a bare number or a brief `{"id": n}` object.
pub fn ref_id_of(value: &Value) -> Option<RecordId> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::Object(map) => map.get("id").and_then(Value::as_u64),
        _ => None,
    }
}

/// A single filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Exact value match; references match on their id.
    Equals(Value),
    /// Case-insensitive string match.
    IEquals(String),
    /// Matches an `address/len` string whose address part equals this one.
    Address(IpAddr),
}

impl Condition {
    /// Returns true if the attribute value satisfies the condition.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Equals(Value::Null) => matches!(value, None | Some(Value::Null)),
            Condition::Equals(expected) => match value {
                Some(actual) if actual == expected => true,
                Some(actual) => match (ref_id_of(actual), expected.as_u64()) {
                    (Some(a), Some(e)) => a == e,
                    _ => false,
                },
                None => false,
            },
            Condition::IEquals(expected) => value
                .and_then(Value::as_str)
                .map(|s| s.eq_ignore_ascii_case(expected))
                .unwrap_or(false),
            Condition::Address(addr) => value
                .and_then(Value::as_str)
                .and_then(|s| s.split('/').next())
                .and_then(|s| s.parse::<IpAddr>().ok())
                .map(|a| a == *addr)
                .unwrap_or(false),
        }
    }
}

/// A conjunction of conditions, each applied to one or more fields.
///
/// A term with several fields matches when any of them matches, which lets a
/// cable be found from either end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    terms: Vec<(Vec<String>, Condition)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an exact-match term.
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.terms
            .push((vec![field.to_string()], Condition::Equals(value.into())));
        self
    }

    /// Adds a case-insensitive string term.
    pub fn ieq(mut self, field: &str, value: &str) -> Self {
        self.terms
            .push((vec![field.to_string()], Condition::IEquals(value.to_string())));
        self
    }

    /// Adds a term matching the address part of an `address/len` field.
    pub fn address(mut self, field: &str, addr: IpAddr) -> Self {
        self.terms
            .push((vec![field.to_string()], Condition::Address(addr)));
        self
    }

    /// Adds an exact-match term satisfied by any of the given fields.
    pub fn eq_any(mut self, fields: &[&str], value: impl Into<Value>) -> Self {
        self.terms.push((
            fields.iter().map(|f| f.to_string()).collect(),
            Condition::Equals(value.into()),
        ));
        self
    }

    pub fn terms(&self) -> &[(Vec<String>, Condition)] {
        &self.terms
    }

    /// Returns true if the record satisfies every term.
    pub fn matches(&self, record: &RemoteRecord) -> bool {
        self.terms.iter().all(|(fields, cond)| {
            fields.iter().any(|f| {
                if f == "id" {
                    cond.matches(Some(&Value::from(record.id())))
                } else {
                    cond.matches(record.get(f))
                }
            })
        })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .terms
            .iter()
            .map(|(fields, cond)| {
                let value = match cond {
                    Condition::Equals(v) => v.to_string(),
                    Condition::IEquals(s) => format!("~{}", s),
                    Condition::Address(a) => a.to_string(),
                };
                format!("{}={}", fields.join("|"), value)
            })
            .collect();
        f.write_str(&parts.join("&"))
    }
}
