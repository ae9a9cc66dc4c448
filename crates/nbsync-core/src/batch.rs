//! Bulk execution with per-item fallback.
//!
//! A bulk call is an optimization only. When it fails, every item is replayed
//! through the single-item path so one bad payload cannot block the rest.

use async_trait::async_trait;
use nbsync_types::MacAddress;
use tracing::{debug, info, warn};

use crate::directory::Directory;
use crate::error::DirectoryResult;
use crate::record::{EntityKind, Payload, RecordId, RemoteRecord};
use crate::stats::{Action, SyncStats};

/// A payload waiting to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOp {
    pub key: String,
    pub payload: Payload,
}

/// Changes waiting to be applied to an existing record.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOp {
    pub key: String,
    pub id: RecordId,
    pub changes: Payload,
    /// Human-readable notes, one per changed field.
    pub notes: Vec<String>,
}

/// A record waiting to be deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOp {
    pub key: String,
    pub id: RecordId,
}

/// A hardware address waiting to be assigned to an interface.
#[derive(Debug, Clone, PartialEq)]
pub struct MacOp {
    pub key: String,
    pub interface_id: RecordId,
    pub mac: MacAddress,
}

/// One kind of mutation the executor can run in bulk or item by item.
#[async_trait]
pub trait BatchTarget: Send + Sync {
    type Item: Send + Sync;
    type Output: Send;

    /// The outcome recorded for each successful item.
    fn action(&self) -> Action;

    fn kind(&self) -> EntityKind;

    /// Natural key used in stats details and logs.
    fn key<'a>(&self, item: &'a Self::Item) -> &'a str;

    /// Detail message recorded for a successful item.
    fn message(&self, _item: &Self::Item) -> String {
        String::new()
    }

    async fn bulk(
        &self,
        directory: &dyn Directory,
        items: &[Self::Item],
    ) -> DirectoryResult<Vec<Self::Output>>;

    async fn single(
        &self,
        directory: &dyn Directory,
        item: &Self::Item,
    ) -> DirectoryResult<Self::Output>;

    /// The output a dry run returns in place of the real call.
    fn preview(&self, item: &Self::Item) -> Self::Output;
}

/// Creates records of one kind.
#[derive(Debug, Clone, Copy)]
pub struct CreateTarget(pub EntityKind);

#[async_trait]
impl BatchTarget for CreateTarget {
    type Item = CreateOp;
    type Output = RemoteRecord;

    fn action(&self) -> Action {
        Action::Create
    }

    fn kind(&self) -> EntityKind {
        self.0
    }

    fn key<'a>(&self, item: &'a CreateOp) -> &'a str {
        &item.key
    }

    fn message(&self, _item: &CreateOp) -> String {
        format!("created {}", self.0)
    }

    async fn bulk(
        &self,
        directory: &dyn Directory,
        items: &[CreateOp],
    ) -> DirectoryResult<Vec<RemoteRecord>> {
        let payloads = items.iter().map(|i| i.payload.clone()).collect();
        directory.bulk_create(self.0, payloads).await
    }

    async fn single(&self, directory: &dyn Directory, item: &CreateOp) -> DirectoryResult<RemoteRecord> {
        directory.create(self.0, item.payload.clone()).await
    }

    fn preview(&self, item: &CreateOp) -> RemoteRecord {
        RemoteRecord::placeholder(item.payload.clone())
    }
}

/// Updates records of one kind.
#[derive(Debug, Clone, Copy)]
pub struct UpdateTarget(pub EntityKind);

#[async_trait]
impl BatchTarget for UpdateTarget {
    type Item = UpdateOp;
    type Output = RemoteRecord;

    fn action(&self) -> Action {
        Action::Update
    }

    fn kind(&self) -> EntityKind {
        self.0
    }

    fn key<'a>(&self, item: &'a UpdateOp) -> &'a str {
        &item.key
    }

    fn message(&self, item: &UpdateOp) -> String {
        item.notes.join("; ")
    }

    async fn bulk(
        &self,
        directory: &dyn Directory,
        items: &[UpdateOp],
    ) -> DirectoryResult<Vec<RemoteRecord>> {
        let updates = items.iter().map(|i| (i.id, i.changes.clone())).collect();
        directory.bulk_update(self.0, updates).await
    }

    async fn single(&self, directory: &dyn Directory, item: &UpdateOp) -> DirectoryResult<RemoteRecord> {
        directory.update(self.0, item.id, item.changes.clone()).await
    }

    fn preview(&self, item: &UpdateOp) -> RemoteRecord {
        RemoteRecord::new(item.id, item.changes.clone())
    }
}

/// Deletes records of one kind.
#[derive(Debug, Clone, Copy)]
pub struct DeleteTarget(pub EntityKind);

#[async_trait]
impl BatchTarget for DeleteTarget {
    type Item = DeleteOp;
    type Output = ();

    fn action(&self) -> Action {
        Action::Delete
    }

    fn kind(&self) -> EntityKind {
        self.0
    }

    fn key<'a>(&self, item: &'a DeleteOp) -> &'a str {
        &item.key
    }

    fn message(&self, item: &DeleteOp) -> String {
        format!("deleted {} {}", self.0, item.id)
    }

    async fn bulk(&self, directory: &dyn Directory, items: &[DeleteOp]) -> DirectoryResult<Vec<()>> {
        directory
            .bulk_delete(self.0, items.iter().map(|i| i.id).collect())
            .await?;
        Ok(vec![(); items.len()])
    }

    async fn single(&self, directory: &dyn Directory, item: &DeleteOp) -> DirectoryResult<()> {
        directory.delete(self.0, item.id).await
    }

    fn preview(&self, _item: &DeleteOp) {}
}

/// Assigns hardware addresses to interfaces.
#[derive(Debug, Clone, Copy)]
pub struct MacTarget;

#[async_trait]
impl BatchTarget for MacTarget {
    type Item = MacOp;
    type Output = RemoteRecord;

    fn action(&self) -> Action {
        Action::AssignMac
    }

    fn kind(&self) -> EntityKind {
        EntityKind::MacAddress
    }

    fn key<'a>(&self, item: &'a MacOp) -> &'a str {
        &item.key
    }

    fn message(&self, item: &MacOp) -> String {
        format!("mac {}", item.mac)
    }

    async fn bulk(&self, directory: &dyn Directory, items: &[MacOp]) -> DirectoryResult<Vec<RemoteRecord>> {
        let assignments = items.iter().map(|i| (i.interface_id, i.mac)).collect();
        directory.bulk_assign_mac(assignments).await
    }

    async fn single(&self, directory: &dyn Directory, item: &MacOp) -> DirectoryResult<RemoteRecord> {
        directory.assign_mac(item.interface_id, item.mac).await
    }

    fn preview(&self, item: &MacOp) -> RemoteRecord {
        let mut attrs = Payload::new();
        attrs.insert("mac_address".into(), item.mac.to_string().into());
        attrs.insert("interface".into(), item.interface_id.into());
        RemoteRecord::placeholder(attrs)
    }
}

/// Runs batches against a directory.
///
/// In dry-run mode no mutating call is issued; each item is recorded exactly
/// as a successful real call would record it and its preview is returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchExecutor {
    dry_run: bool,
}

impl BatchExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Executes `items` through `target`.
    ///
    /// Returns one entry per input item, in input order: the output on
    /// success, `None` on failure. Items the bulk call returned no record for
    /// count as failed. In the single-item path a transient error is retried
    /// once.
    pub async fn execute<T: BatchTarget>(
        &self,
        directory: &dyn Directory,
        target: &T,
        items: &[T::Item],
        stats: &mut SyncStats,
    ) -> Vec<Option<T::Output>> {
        if items.is_empty() {
            return Vec::new();
        }

        if self.dry_run {
            info!(
                kind = %target.kind(),
                action = %target.action(),
                count = items.len(),
                "dry run, skipping directory call"
            );
            return items
                .iter()
                .map(|item| {
                    stats.record(target.action(), target.key(item), target.message(item));
                    Some(target.preview(item))
                })
                .collect();
        }

        match target.bulk(directory, items).await {
            Ok(outputs) => {
                debug!(
                    kind = %target.kind(),
                    action = %target.action(),
                    count = items.len(),
                    "bulk call succeeded"
                );
                if outputs.len() < items.len() {
                    warn!(
                        kind = %target.kind(),
                        sent = items.len(),
                        returned = outputs.len(),
                        "bulk call returned fewer records than sent"
                    );
                }
                let mut outputs = outputs.into_iter();
                items
                    .iter()
                    .map(|item| match outputs.next() {
                        Some(output) => {
                            stats.record(target.action(), target.key(item), target.message(item));
                            Some(output)
                        }
                        None => {
                            stats.record_failure(
                                target.key(item),
                                target.action(),
                                "no record returned by bulk call",
                            );
                            None
                        }
                    })
                    .collect()
            }
            Err(err) => {
                warn!(
                    kind = %target.kind(),
                    action = %target.action(),
                    count = items.len(),
                    error = %err,
                    "bulk call failed, falling back to single calls"
                );
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    let mut outcome = target.single(directory, item).await;
                    if let Err(e) = &outcome {
                        if e.is_retryable() {
                            debug!(key = target.key(item), error = %e, "retrying item once");
                            outcome = target.single(directory, item).await;
                        }
                    }
                    match outcome {
                        Ok(output) => {
                            stats.record(target.action(), target.key(item), target.message(item));
                            results.push(Some(output));
                        }
                        Err(e) => {
                            warn!(key = target.key(item), error = %e, "item failed");
                            stats.record_failure(target.key(item), target.action(), &e);
                            results.push(None);
                        }
                    }
                }
                results
            }
        }
    }
}
