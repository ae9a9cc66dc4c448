//! Interface orchestration.
//!
//! [`sync_interfaces`] runs the full sequence for one device:
//!
//! 1. Resolve the device (name, then addresses)
//! 2. Warm the VLAN cache for the device's site and global VLANs
//! 3. Fetch the device's interfaces once
//! 4. Derive directory values and order LAGs first
//! 5. Compare, then create in two phases (LAGs, then the rest)
//! 6. Update through the per-field [`checks`]
//! 7. Assign hardware addresses, including unchanged interfaces
//! 8. Delete members, then LAGs

pub mod checks;
mod fields;
mod sync;

pub use fields::{
    DesiredInterface, InterfaceFieldSource, BASE_FIELDS, DESCRIPTION, DUPLEX, ENABLED, LAG, MAC,
    MODE, MTU, SPEED, TAGGED_VLANS, TYPE, UNTAGGED_VLAN,
};
pub(crate) use fields::choice;
pub use sync::sync_interfaces;
