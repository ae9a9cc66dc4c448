//! Reconciliation engine for nbsync.
//!
//! This crate provides the pieces every entity orchestrator composes:
//!
//! - [`compare`]: pure diff of local records against remote records
//! - [`Diff`] / [`ChangeItem`]: the change model produced by a comparison
//! - [`BatchExecutor`]: bulk mutations with per-item fallback and dry run
//! - [`DirectoryCache`] / [`Resolver`]: per-run lookup memoization and
//!   get-or-create for reference entities
//! - [`Directory`]: the remote directory collaborator, with
//!   [`MemoryDirectory`] as an in-process implementation
//! - [`SyncStats`]: counters and per-item outcomes
//!
//! # Flow
//!
//! 1. Fetch remote records through the cache (one bulk read per scope)
//! 2. `compare()` them with collected local records into a `Diff`
//! 3. Build payloads for creates, updates and deletes
//! 4. Run each batch through the `BatchExecutor`, which records `SyncStats`

mod batch;
mod cache;
mod change;
mod compare;
mod context;
mod directory;
mod error;
mod memory;
mod record;
mod resolver;
mod stats;

pub use batch::{
    BatchExecutor, BatchTarget, CreateOp, CreateTarget, DeleteOp, DeleteTarget, MacOp, MacTarget,
    UpdateOp, UpdateTarget,
};
pub use cache::{CacheStats, DirectoryCache};
pub use change::{ChangeItem, ChangeKind, Diff, FieldChange, FieldValue, SkipReason};
pub use compare::{compare, field_changes, CompareOptions, ExcludeSet, FieldSource, LocalRecord};
pub use context::RunContext;
pub use directory::Directory;
pub use error::{DirectoryError, DirectoryResult};
pub use memory::{CallOp, DirectoryCall, MemoryDirectory};
pub use record::{ref_id_of, Condition, EntityKind, Payload, Query, RecordId, RemoteRecord};
pub use resolver::{slugify, Resolver};
pub use stats::{Action, StatCounters, StatDetail, SyncStats};
