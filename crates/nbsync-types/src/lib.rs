//! Network value types shared by the nbsync reconciliation crates.
//!
//! This crate provides type-safe representations of the values collected
//! from network devices and compared against the source-of-truth directory:
//!
//! - [`MacAddress`]: 48-bit hardware addresses in any common notation
//! - [`IpInterface`]: an address together with its prefix length
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers
//! - [`VlanSet`]: unordered VLAN membership with set differences
//! - [`iface`]: interface name normalization and attribute parsing

pub mod iface;
mod ip;
mod mac;
mod vlan;

pub use iface::{Duplex, EnabledMode, InterfaceClass, SwitchportMode};
pub use ip::IpInterface;
pub use mac::MacAddress;
pub use vlan::{VlanId, VlanSet};

/// Maximum length of an inventory item name in the directory.
pub const INVENTORY_NAME_MAX: usize = 64;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("invalid VLAN list: {0}")]
    InvalidVlanList(String),
}
