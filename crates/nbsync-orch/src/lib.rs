//! Entity orchestrators for nbsync.
//!
//! Each entity family has its own module with one entry point taking the
//! per-run [`SyncOrch`] and returning [`SyncStats`](nbsync_core::SyncStats):
//!
//! - [`devices::sync_device`]: the device record and its references
//! - [`vlans::sync_vlans`]: site VLANs from SVIs and collected VLANs
//! - [`interfaces::sync_interfaces`]: interfaces, LAG membership, VLANs and
//!   hardware addresses
//! - [`ip_addresses::sync_ip_addresses`]: addresses and device primaries
//! - [`cables::sync_cables`]: cables from neighbor discovery
//! - [`inventory::sync_inventory`]: modules and optics
//!
//! [`runner::run_devices`] strings them together for many devices.
//!
//! # Example
//!
//! ```no_run
//! use nbsync_core::MemoryDirectory;
//! use nbsync_orch::{run_devices, DeviceSnapshot, SyncConfig};
//! use std::sync::Arc;
//!
//! # async fn example(snapshots: Vec<DeviceSnapshot>) {
//! let config = SyncConfig::load_or_default("nbsync.toml").unwrap();
//! let directory = Arc::new(MemoryDirectory::new());
//! for report in run_devices(directory, &config, &snapshots).await {
//!     println!("{}: {:?}", report.device, report.totals());
//! }
//! # }
//! ```

pub mod cables;
pub mod config;
pub mod devices;
pub mod error;
pub mod interfaces;
pub mod inventory;
pub mod ip_addresses;
mod orchestrator;
mod planned;
pub mod records;
pub mod runner;
pub mod vlans;

pub use config::{
    CableSyncConfig, DeviceSyncConfig, EntityOptions, GeneralConfig, InterfaceSyncConfig,
    InventorySyncConfig, IpSyncConfig, MacPolicy, SyncConfig, VlanSyncConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use orchestrator::{RunClaims, SyncOrch};
pub use planned::{PayloadSource, PlannedRecord};
pub use records::{
    DeviceRecord, DeviceSnapshot, IdentityType, InterfaceRecord, InventoryRecord, IpRecord,
    NeighborIdentity, NeighborRecord, VlanRecord,
};
pub use runner::{run_devices, sync_snapshot, DeviceReport};
