//! In-memory directory used for dry integration and tests.
//!
//! `MemoryDirectory` behaves like a small NetBox: it validates required
//! fields and uniqueness, applies bulk calls atomically, renders nested
//! references as brief `{"id": n}` objects and logs every call so tests can
//! assert on ordering and round-trip counts.

use async_trait::async_trait;
use nbsync_types::{MacAddress, INVENTORY_NAME_MAX};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::directory::Directory;
use crate::error::{DirectoryError, DirectoryResult};
use crate::record::{EntityKind, Payload, Query, RecordId, RemoteRecord};

/// Attributes stored as references to other records.
const REF_FIELDS: &[&str] = &[
    "site",
    "role",
    "manufacturer",
    "device_type",
    "platform",
    "tenant",
    "device",
    "interface",
    "lag",
    "untagged_vlan",
    "tagged_vlans",
    "a_device",
    "a_interface",
    "b_device",
    "b_interface",
    "primary_ip4",
    "primary_ip6",
];

/// Kind of call recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallOp {
    Get,
    Filter,
    Create,
    Update,
    Delete,
    BulkCreate,
    BulkUpdate,
    BulkDelete,
    AssignMac,
    BulkAssignMac,
}

impl CallOp {
    /// Returns true if the call writes to the directory.
    pub const fn is_mutating(&self) -> bool {
        !matches!(self, CallOp::Get | CallOp::Filter)
    }
}

/// One logged directory call.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryCall {
    pub op: CallOp,
    pub kind: EntityKind,
    /// Names (or `#id` labels) of the items carried by the call.
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
enum FailureRule {
    Reject {
        kind: EntityKind,
        field: String,
        value: Value,
    },
    FailBulk(EntityKind),
    FailReads(EntityKind),
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<EntityKind, BTreeMap<RecordId, Payload>>,
    next_id: RecordId,
    calls: Vec<DirectoryCall>,
    rules: Vec<FailureRule>,
}

/// Thread-safe in-memory [`Directory`].
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    state: Mutex<MemoryState>,
    interleave: AtomicBool,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record without validation or logging. Returns its id.
    pub fn seed(&self, kind: EntityKind, attrs: Value) -> RecordId {
        let mut state = self.state.lock();
        let payload = match attrs {
            Value::Object(map) => normalize(map),
            _ => Payload::new(),
        };
        state.insert(kind, payload)
    }

    /// Returns every record of a kind as the directory would render it.
    pub fn records(&self, kind: EntityKind) -> Vec<RemoteRecord> {
        let state = self.state.lock();
        state
            .tables
            .get(&kind)
            .map(|t| t.iter().map(|(id, p)| render(*id, p)).collect())
            .unwrap_or_default()
    }

    /// Returns one record without logging the read.
    pub fn record(&self, kind: EntityKind, id: RecordId) -> Option<RemoteRecord> {
        let state = self.state.lock();
        state
            .tables
            .get(&kind)
            .and_then(|t| t.get(&id))
            .map(|p| render(id, p))
    }

    /// Returns the first record with the given name without logging the read.
    pub fn find_by_name(&self, kind: EntityKind, name: &str) -> Option<RemoteRecord> {
        self.records(kind)
            .into_iter()
            .find(|r| r.name() == Some(name))
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        let state = self.state.lock();
        state.tables.get(&kind).map(|t| t.len()).unwrap_or(0)
    }

    /// Returns a copy of the call log.
    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.state.lock().calls.clone()
    }

    /// Returns only the calls that write to the directory.
    pub fn mutating_calls(&self) -> Vec<DirectoryCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.op.is_mutating())
            .cloned()
            .collect()
    }

    /// Counts logged calls of one operation on one kind.
    pub fn call_count(&self, op: CallOp, kind: EntityKind) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.op == op && c.kind == kind)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Rejects any create or update of `kind` whose payload sets `field` to
    /// `value`.
    pub fn reject(&self, kind: EntityKind, field: &str, value: impl Into<Value>) {
        self.state.lock().rules.push(FailureRule::Reject {
            kind,
            field: field.to_string(),
            value: value.into(),
        });
    }

    /// Makes every bulk call on `kind` fail with a transport error.
    pub fn fail_bulk(&self, kind: EntityKind) {
        self.state.lock().rules.push(FailureRule::FailBulk(kind));
    }

    /// Makes every read of `kind` fail with a transport error.
    pub fn fail_reads(&self, kind: EntityKind) {
        self.state.lock().rules.push(FailureRule::FailReads(kind));
    }

    pub fn clear_failures(&self) {
        self.state.lock().rules.clear();
    }

    /// Makes every call yield to the runtime before it runs, so concurrent
    /// callers interleave the way they would against a remote directory.
    pub fn interleave_calls(&self) {
        self.interleave.store(true, Ordering::Relaxed);
    }

    async fn pause(&self) {
        if self.interleave.load(Ordering::Relaxed) {
            tokio::task::yield_now().await;
        }
    }
}

impl MemoryState {
    fn insert(&mut self, kind: EntityKind, payload: Payload) -> RecordId {
        self.next_id += 1;
        let id = self.next_id;
        self.tables.entry(kind).or_default().insert(id, payload);
        id
    }

    fn log(&mut self, op: CallOp, kind: EntityKind, labels: Vec<String>) {
        debug!(?op, %kind, count = labels.len(), "memory directory call");
        self.calls.push(DirectoryCall { op, kind, labels });
    }

    fn check_reads(&self, kind: EntityKind, operation: &str) -> DirectoryResult<()> {
        let failing = self
            .rules
            .iter()
            .any(|r| matches!(r, FailureRule::FailReads(k) if *k == kind));
        if failing {
            return Err(DirectoryError::transport(operation, "connection reset"));
        }
        Ok(())
    }

    fn check_bulk(&self, kind: EntityKind, operation: &str) -> DirectoryResult<()> {
        let failing = self
            .rules
            .iter()
            .any(|r| matches!(r, FailureRule::FailBulk(k) if *k == kind));
        if failing {
            return Err(DirectoryError::transport(operation, "bulk endpoint unavailable"));
        }
        Ok(())
    }

    fn exists(&self, kind: EntityKind, id: RecordId) -> bool {
        self.tables
            .get(&kind)
            .map(|t| t.contains_key(&id))
            .unwrap_or(false)
    }

    /// Validates a record. `pending` holds records accepted earlier in the
    /// same call; `skip` is the id being replaced by an update, whose
    /// `changes` are the only fields checked for presence.
    fn validate(
        &self,
        kind: EntityKind,
        payload: &Payload,
        pending: &[Payload],
        skip: Option<(RecordId, &Payload)>,
    ) -> DirectoryResult<()> {
        for rule in &self.rules {
            if let FailureRule::Reject {
                kind: k,
                field,
                value,
            } = rule
            {
                if *k == kind && payload.get(field) == Some(value) {
                    return Err(DirectoryError::validation(
                        kind,
                        format!("{} {} is not allowed", field, value),
                    ));
                }
            }
        }

        for field in required_fields(kind) {
            if matches!(skip, Some((_, changes)) if !changes.contains_key(*field)) {
                continue;
            }
            let missing = match payload.get(*field) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            };
            if missing {
                return Err(DirectoryError::validation(
                    kind,
                    format!("{} is required", field),
                ));
            }
        }

        if kind == EntityKind::InventoryItem {
            let len = payload
                .get("name")
                .and_then(Value::as_str)
                .map(|s| s.chars().count())
                .unwrap_or(0);
            if len > INVENTORY_NAME_MAX {
                return Err(DirectoryError::validation(
                    kind,
                    format!("name exceeds {} characters", INVENTORY_NAME_MAX),
                ));
            }
        }

        let unique = unique_fields(kind);
        if unique.is_empty() {
            return Ok(());
        }
        let key = |p: &Payload| -> Vec<Value> {
            unique
                .iter()
                .map(|f| p.get(*f).cloned().unwrap_or(Value::Null))
                .collect()
        };
        let wanted = key(payload);
        let existing = self
            .tables
            .get(&kind)
            .into_iter()
            .flat_map(|t| t.iter())
            .filter(|(id, _)| skip.map(|(s, _)| s) != Some(**id))
            .map(|(_, p)| p);
        if existing.chain(pending.iter()).any(|p| key(p) == wanted) {
            return Err(DirectoryError::conflict(
                kind,
                format!("{} must be unique", unique.join("+")),
            ));
        }
        Ok(())
    }

    fn create_all(
        &mut self,
        kind: EntityKind,
        payloads: Vec<Payload>,
    ) -> DirectoryResult<Vec<RemoteRecord>> {
        let payloads: Vec<Payload> = payloads.into_iter().map(normalize).collect();
        let mut accepted: Vec<Payload> = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            self.validate(kind, payload, &accepted, None)?;
            accepted.push(payload.clone());
        }
        Ok(accepted
            .into_iter()
            .map(|p| {
                let id = self.insert(kind, p.clone());
                render(id, &p)
            })
            .collect())
    }

    fn update_all(
        &mut self,
        kind: EntityKind,
        updates: Vec<(RecordId, Payload)>,
    ) -> DirectoryResult<Vec<RemoteRecord>> {
        let mut merged = Vec::with_capacity(updates.len());
        for (id, changes) in updates {
            let mut current = self
                .tables
                .get(&kind)
                .and_then(|t| t.get(&id))
                .cloned()
                .ok_or_else(|| DirectoryError::not_found(kind, id))?;
            let changes = normalize(changes);
            for (k, v) in &changes {
                current.insert(k.clone(), v.clone());
            }
            self.validate(kind, &current, &[], Some((id, &changes)))?;
            merged.push((id, current));
        }
        let table = self.tables.entry(kind).or_default();
        Ok(merged
            .into_iter()
            .map(|(id, p)| {
                let record = render(id, &p);
                table.insert(id, p);
                record
            })
            .collect())
    }

    fn delete_all(&mut self, kind: EntityKind, ids: &[RecordId]) -> DirectoryResult<()> {
        for id in ids {
            if !self.exists(kind, *id) {
                return Err(DirectoryError::not_found(kind, *id));
            }
        }
        if kind == EntityKind::Interface {
            let interfaces = self.tables.get(&kind);
            for id in ids {
                let member = interfaces.into_iter().flat_map(|t| t.iter()).find(|(mid, p)| {
                    !ids.contains(mid)
                        && p.get("lag").and_then(Value::as_u64) == Some(*id)
                });
                if let Some((mid, _)) = member {
                    return Err(DirectoryError::conflict(
                        kind,
                        format!("interface {} is still the LAG of interface {}", id, mid),
                    ));
                }
            }
        }
        if let Some(table) = self.tables.get_mut(&kind) {
            for id in ids {
                table.remove(id);
            }
        }
        Ok(())
    }

    fn assign_all(
        &mut self,
        assignments: &[(RecordId, MacAddress)],
    ) -> DirectoryResult<Vec<RemoteRecord>> {
        for (interface_id, _) in assignments {
            if !self.exists(EntityKind::Interface, *interface_id) {
                return Err(DirectoryError::not_found(EntityKind::Interface, *interface_id));
            }
        }
        let mut out = Vec::with_capacity(assignments.len());
        for (interface_id, mac) in assignments {
            let mut payload = Payload::new();
            payload.insert("mac_address".into(), Value::from(mac.to_string()));
            payload.insert("interface".into(), Value::from(*interface_id));
            let id = self.insert(EntityKind::MacAddress, payload.clone());
            if let Some(iface) = self
                .tables
                .get_mut(&EntityKind::Interface)
                .and_then(|t| t.get_mut(interface_id))
            {
                iface.insert("mac_address".into(), Value::from(mac.to_string()));
            }
            out.push(render(id, &payload));
        }
        Ok(out)
    }
}

fn required_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Interface => &["device", "name", "type"],
        EntityKind::IpAddress => &["address"],
        EntityKind::Vlan => &["vid", "name"],
        EntityKind::Cable => &["a_interface", "b_interface"],
        EntityKind::Device => &["name", "device_type", "role", "site"],
        EntityKind::InventoryItem => &["device", "name"],
        EntityKind::MacAddress => &["mac_address"],
        EntityKind::DeviceType => &["model", "slug", "manufacturer"],
        _ => &["name", "slug"],
    }
}

fn unique_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Interface => &["device", "name"],
        EntityKind::Device => &["name"],
        EntityKind::Vlan => &["site", "vid"],
        EntityKind::InventoryItem => &["device", "name"],
        k if k.is_reference() => &["slug"],
        _ => &[],
    }
}

/// Stores nested references as bare ids.
fn normalize(mut payload: Payload) -> Payload {
    payload.remove("id");
    for field in REF_FIELDS {
        if let Some(value) = payload.get_mut(*field) {
            match value {
                Value::Object(map) => {
                    if let Some(id) = map.get("id").cloned() {
                        *value = id;
                    }
                }
                Value::Array(items) => {
                    for item in items.iter_mut() {
                        if let Value::Object(map) = item {
                            if let Some(id) = map.get("id").cloned() {
                                *item = id;
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    payload
}

/// Renders nested references as brief objects.
fn render(id: RecordId, stored: &Payload) -> RemoteRecord {
    let brief = |v: &Value| match v {
        Value::Number(n) => {
            let mut map = Payload::new();
            map.insert("id".into(), Value::Number(n.clone()));
            Value::Object(map)
        }
        other => other.clone(),
    };
    let mut attrs = stored.clone();
    for field in REF_FIELDS {
        if let Some(value) = attrs.get_mut(*field) {
            let rendered = match &*value {
                Value::Array(items) => Value::Array(items.iter().map(brief).collect()),
                other => brief(other),
            };
            *value = rendered;
        }
    }
    RemoteRecord::new(id, attrs)
}

fn label_of(payload: &Payload) -> String {
    ["name", "address", "model", "mac_address"]
        .iter()
        .find_map(|f| payload.get(*f).and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| payload.get("vid").map(|v| v.to_string()))
        .unwrap_or_else(|| "-".to_string())
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn get(&self, kind: EntityKind, id: RecordId) -> DirectoryResult<Option<RemoteRecord>> {
        self.pause().await;
        let mut state = self.state.lock();
        state.log(CallOp::Get, kind, vec![format!("#{}", id)]);
        state.check_reads(kind, "get")?;
        Ok(state
            .tables
            .get(&kind)
            .and_then(|t| t.get(&id))
            .map(|p| render(id, p)))
    }

    async fn filter(&self, kind: EntityKind, query: &Query) -> DirectoryResult<Vec<RemoteRecord>> {
        self.pause().await;
        let mut state = self.state.lock();
        state.log(CallOp::Filter, kind, vec![query.to_string()]);
        state.check_reads(kind, "filter")?;
        Ok(state
            .tables
            .get(&kind)
            .into_iter()
            .flat_map(|t| t.iter())
            .map(|(id, p)| render(*id, p))
            .filter(|r| query.matches(r))
            .collect())
    }

    async fn create(&self, kind: EntityKind, payload: Payload) -> DirectoryResult<RemoteRecord> {
        self.pause().await;
        let mut state = self.state.lock();
        state.log(CallOp::Create, kind, vec![label_of(&payload)]);
        let mut created = state.create_all(kind, vec![payload])?;
        created
            .pop()
            .ok_or_else(|| DirectoryError::internal("create returned no record"))
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: RecordId,
        changes: Payload,
    ) -> DirectoryResult<RemoteRecord> {
        self.pause().await;
        let mut state = self.state.lock();
        state.log(CallOp::Update, kind, vec![format!("#{}", id)]);
        let mut updated = state.update_all(kind, vec![(id, changes)])?;
        updated
            .pop()
            .ok_or_else(|| DirectoryError::internal("update returned no record"))
    }

    async fn delete(&self, kind: EntityKind, id: RecordId) -> DirectoryResult<()> {
        self.pause().await;
        let mut state = self.state.lock();
        state.log(CallOp::Delete, kind, vec![format!("#{}", id)]);
        state.delete_all(kind, &[id])
    }

    async fn bulk_create(
        &self,
        kind: EntityKind,
        payloads: Vec<Payload>,
    ) -> DirectoryResult<Vec<RemoteRecord>> {
        self.pause().await;
        let mut state = self.state.lock();
        state.log(CallOp::BulkCreate, kind, payloads.iter().map(label_of).collect());
        state.check_bulk(kind, "bulk_create")?;
        state.create_all(kind, payloads)
    }

    async fn bulk_update(
        &self,
        kind: EntityKind,
        updates: Vec<(RecordId, Payload)>,
    ) -> DirectoryResult<Vec<RemoteRecord>> {
        self.pause().await;
        let mut state = self.state.lock();
        state.log(
            CallOp::BulkUpdate,
            kind,
            updates.iter().map(|(id, _)| format!("#{}", id)).collect(),
        );
        state.check_bulk(kind, "bulk_update")?;
        state.update_all(kind, updates)
    }

    async fn bulk_delete(&self, kind: EntityKind, ids: Vec<RecordId>) -> DirectoryResult<()> {
        self.pause().await;
        let mut state = self.state.lock();
        state.log(
            CallOp::BulkDelete,
            kind,
            ids.iter().map(|id| format!("#{}", id)).collect(),
        );
        state.check_bulk(kind, "bulk_delete")?;
        state.delete_all(kind, &ids)
    }

    async fn assign_mac(
        &self,
        interface_id: RecordId,
        mac: MacAddress,
    ) -> DirectoryResult<RemoteRecord> {
        self.pause().await;
        let mut state = self.state.lock();
        state.log(CallOp::AssignMac, EntityKind::MacAddress, vec![mac.to_string()]);
        let mut assigned = state.assign_all(&[(interface_id, mac)])?;
        assigned
            .pop()
            .ok_or_else(|| DirectoryError::internal("assignment returned no record"))
    }

    async fn bulk_assign_mac(
        &self,
        assignments: Vec<(RecordId, MacAddress)>,
    ) -> DirectoryResult<Vec<RemoteRecord>> {
        self.pause().await;
        let mut state = self.state.lock();
        state.log(
            CallOp::BulkAssignMac,
            EntityKind::MacAddress,
            assignments.iter().map(|(_, m)| m.to_string()).collect(),
        );
        state.check_bulk(EntityKind::MacAddress, "bulk_assign_mac")?;
        state.assign_all(&assignments)
    }
}
