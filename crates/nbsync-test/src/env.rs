//! In-memory directory environment.

use nbsync_core::{EntityKind, MemoryDirectory, RecordId};
use nbsync_orch::{run_devices, ConfigResult, DeviceReport, DeviceSnapshot, SyncConfig};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Routes `tracing` output through the test harness, filtered by `RUST_LOG`
/// (default `warn`). Safe to call from every test.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_test_writer())
        .try_init();
}

/// A directory plus the configuration runs are made with.
///
/// Configuration handed over as TOML text is written to a temporary file
/// and loaded the same way a deployment loads it.
pub struct TestEnv {
    directory: Arc<MemoryDirectory>,
    config: SyncConfig,
    config_dir: Option<TempDir>,
}

impl TestEnv {
    /// An empty directory with default configuration.
    pub fn new() -> Self {
        init_test_logging();
        Self {
            directory: Arc::new(MemoryDirectory::new()),
            config: SyncConfig::default(),
            config_dir: None,
        }
    }

    /// An empty directory with configuration loaded from `toml`.
    pub fn with_config_toml(toml: &str) -> ConfigResult<Self> {
        init_test_logging();
        let dir = TempDir::new()?;
        let path = dir.path().join("nbsync.toml");
        fs::write(&path, toml)?;
        let config = SyncConfig::load_or_default(&path)?;
        debug!(path = %path.display(), "loaded scenario config");
        Ok(Self {
            directory: Arc::new(MemoryDirectory::new()),
            config,
            config_dir: Some(dir),
        })
    }

    pub fn directory(&self) -> &MemoryDirectory {
        &self.directory
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SyncConfig {
        &mut self.config
    }

    /// Path of the loaded configuration file, if one was written.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config_dir
            .as_ref()
            .map(|d| d.path().join("nbsync.toml"))
    }

    /// Seeds a site and returns its id.
    pub fn seed_site(&self, name: &str) -> RecordId {
        self.directory.seed(
            EntityKind::Site,
            json!({"name": name, "slug": nbsync_core::slugify(name)}),
        )
    }

    /// Seeds a bare device at `site`.
    pub fn seed_device(&self, name: &str, site: RecordId) -> RecordId {
        self.directory
            .seed(EntityKind::Device, json!({"name": name, "site": site}))
    }

    /// Seeds an interface on `device`.
    pub fn seed_interface(&self, device: RecordId, name: &str, kind: &str) -> RecordId {
        self.directory.seed(
            EntityKind::Interface,
            json!({"device": device, "name": name, "type": kind}),
        )
    }

    /// Runs every snapshot with the environment's configuration.
    pub async fn run(&self, snapshots: &[DeviceSnapshot]) -> Vec<DeviceReport> {
        run_devices(self.directory.clone(), &self.config, snapshots).await
    }

    /// Same as [`run`](Self::run) with dry-run forced on.
    pub async fn run_dry(&self, snapshots: &[DeviceSnapshot]) -> Vec<DeviceReport> {
        let mut config = self.config.clone();
        config.general.dry_run = true;
        run_devices(self.directory.clone(), &config, snapshots).await
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
