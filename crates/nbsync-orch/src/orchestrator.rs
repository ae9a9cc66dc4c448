//! SyncOrch - state shared by the entity orchestrators for one run.
//!
//! Entity logic lives in the sibling modules as free functions taking
//! `&mut SyncOrch`; this struct only owns the directory handle, the
//! configuration and the per-run cache and context. A fresh instance must be
//! built for every run so no cache entry outlives it.

use nbsync_core::{BatchExecutor, Directory, DirectoryCache, RecordId, RemoteRecord, Resolver, RunContext};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::config::SyncConfig;
use crate::records::DeviceRecord;

/// Keys of records claimed for creation by any device of one run.
///
/// Both ends of a link may reach the create step before either write lands;
/// only the first claim of a key creates it.
#[derive(Debug, Clone, Default)]
pub struct RunClaims(Arc<Mutex<HashSet<String>>>);

impl RunClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` was not claimed before.
    pub fn claim(&self, key: &str) -> bool {
        self.0.lock().insert(key.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

pub struct SyncOrch {
    pub(crate) directory: Arc<dyn Directory>,
    pub(crate) config: SyncConfig,
    pub(crate) cache: DirectoryCache,
    pub(crate) executor: BatchExecutor,
    pub(crate) resolver: Resolver,
    pub(crate) ctx: RunContext,
    pub(crate) claims: RunClaims,
}

impl SyncOrch {
    /// Creates an orchestrator with an empty cache and a new run id.
    pub fn new(directory: Arc<dyn Directory>, config: SyncConfig) -> Self {
        let ctx = RunContext::new(config.general.dry_run);
        Self::with_context(directory, config, ctx)
    }

    /// Creates an orchestrator for an existing run. `ctx.dry_run` wins over
    /// the configuration.
    pub fn with_context(directory: Arc<dyn Directory>, config: SyncConfig, ctx: RunContext) -> Self {
        Self {
            directory,
            config,
            cache: DirectoryCache::new(),
            executor: BatchExecutor::new(ctx.dry_run),
            resolver: Resolver::new(ctx.dry_run),
            ctx,
            claims: RunClaims::new(),
        }
    }

    /// Shares `claims` with the other orchestrators of the same run.
    pub fn with_claims(mut self, claims: RunClaims) -> Self {
        self.claims = claims;
        self
    }

    pub fn ctx(&self) -> &RunContext {
        &self.ctx
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    pub fn is_dry_run(&self) -> bool {
        self.ctx.dry_run
    }

    /// Finds the directory record of a collected device: by name first, then
    /// by each of its addresses.
    pub async fn resolve_device(&mut self, device: &DeviceRecord) -> Option<RemoteRecord> {
        let directory = self.directory.as_ref();
        if let Some(found) = self.cache.find_device(directory, &device.name).await {
            return Some(found);
        }
        for address in &device.addresses {
            if let Some(found) = self.cache.find_device_by_address(directory, address).await {
                debug!(device = %device.name, address = %address, "device resolved by address");
                return Some(found);
            }
        }
        None
    }
}

impl fmt::Debug for SyncOrch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrch")
            .field("run_id", &self.ctx.run_id)
            .field("dry_run", &self.ctx.dry_run)
            .field("cache", &self.cache.stats())
            .field("claims", &self.claims.len())
            .finish()
    }
}

/// Returns the site id of a device record.
pub(crate) fn site_of(device: &RemoteRecord) -> Option<RecordId> {
    device.ref_id("site")
}
