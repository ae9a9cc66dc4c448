//! The remote directory collaborator.

use async_trait::async_trait;
use nbsync_types::MacAddress;

use crate::error::DirectoryResult;
use crate::record::{EntityKind, Payload, Query, RecordId, RemoteRecord};

/// CRUD and bulk access to the source-of-truth directory.
///
/// This is the only interface the engine calls outward. Bulk operations are
/// atomic: either every item is applied or the call fails as a whole. The
/// single-item mutations exist for the batch executor's fallback path.
///
/// Implementations bound their own call duration; the engine has no timeout
/// policy.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Fetches one record by id.
    async fn get(&self, kind: EntityKind, id: RecordId) -> DirectoryResult<Option<RemoteRecord>>;

    /// Returns every record of `kind` matching the query.
    async fn filter(&self, kind: EntityKind, query: &Query) -> DirectoryResult<Vec<RemoteRecord>>;

    async fn create(&self, kind: EntityKind, payload: Payload) -> DirectoryResult<RemoteRecord>;

    async fn update(
        &self,
        kind: EntityKind,
        id: RecordId,
        changes: Payload,
    ) -> DirectoryResult<RemoteRecord>;

    async fn delete(&self, kind: EntityKind, id: RecordId) -> DirectoryResult<()>;

    async fn bulk_create(
        &self,
        kind: EntityKind,
        payloads: Vec<Payload>,
    ) -> DirectoryResult<Vec<RemoteRecord>>;

    async fn bulk_update(
        &self,
        kind: EntityKind,
        updates: Vec<(RecordId, Payload)>,
    ) -> DirectoryResult<Vec<RemoteRecord>>;

    async fn bulk_delete(&self, kind: EntityKind, ids: Vec<RecordId>) -> DirectoryResult<()>;

    /// Assigns a hardware address to an interface.
    ///
    /// Hardware addresses are separate directory entities; the returned record
    /// is the address object, not the interface.
    async fn assign_mac(
        &self,
        interface_id: RecordId,
        mac: MacAddress,
    ) -> DirectoryResult<RemoteRecord>;

    async fn bulk_assign_mac(
        &self,
        assignments: Vec<(RecordId, MacAddress)>,
    ) -> DirectoryResult<Vec<RemoteRecord>>;

    /// Returns the first record matching the query.
    async fn get_one(&self, kind: EntityKind, query: &Query) -> DirectoryResult<Option<RemoteRecord>> {
        Ok(self.filter(kind, query).await?.into_iter().next())
    }

    /// Looks a record up by its exact name.
    async fn get_by_name(&self, kind: EntityKind, name: &str) -> DirectoryResult<Option<RemoteRecord>> {
        self.get_one(kind, &Query::new().eq("name", name)).await
    }
}
