//! Sync configuration.
//!
//! Loaded once per run from TOML and never reloaded mid-run. Every section
//! and key is optional:
//!
//! ```toml
//! [general]
//! dry_run = true
//! cleanup = false
//! concurrency = 8
//!
//! [interfaces]
//! enabled_mode = "link"
//! exclude_interfaces = ["^Vlan1$", "^Null"]
//! mac_policy = "with_ip"
//!
//! [interfaces.fields]
//! mtu = false
//!
//! [devices.defaults]
//! site = "unassigned"
//! role = "network"
//! ```
//!
//! A field missing from a `[*.fields]` table is compared; only an explicit
//! `false` turns it off.

use nbsync_core::ExcludeSet;
use nbsync_types::EnabledMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::records::IdentityType;

/// Settings shared by every entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Compute and report changes without writing them.
    #[serde(default)]
    pub dry_run: bool,

    /// Delete remote records that no longer exist locally.
    #[serde(default)]
    pub cleanup: bool,

    /// Devices reconciled in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Options every entity section accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityOptions {
    /// Reconcile this entity at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Create records that exist only locally.
    #[serde(default = "default_true")]
    pub create_missing: bool,

    /// Update records whose fields differ.
    #[serde(default = "default_true")]
    pub update_existing: bool,

    /// Overrides `general.cleanup` for this entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<bool>,

    /// Per-field compare switches.
    #[serde(default)]
    pub fields: BTreeMap<String, bool>,

    /// Values for required fields the collector did not supply.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

/// When to assign an interface's hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacPolicy {
    #[default]
    Always,
    /// Only interfaces that carry an IP address.
    WithIp,
    Never,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSyncConfig {
    #[serde(flatten)]
    pub options: EntityOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceSyncConfig {
    #[serde(flatten)]
    pub options: EntityOptions,

    /// How a status string maps to `enabled`.
    #[serde(default)]
    pub enabled_mode: EnabledMode,

    /// Compare and push VLAN membership.
    #[serde(default = "default_true")]
    pub sync_vlans: bool,

    /// Derive and compare the interface type.
    #[serde(default = "default_true")]
    pub auto_type: bool,

    /// Regular expressions; matching interface names are left alone.
    #[serde(default)]
    pub exclude_interfaces: Vec<String>,

    #[serde(default)]
    pub mac_policy: MacPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpSyncConfig {
    #[serde(flatten)]
    pub options: EntityOptions,

    /// Honor the collector's `primary` flag.
    #[serde(default = "default_true")]
    pub set_primary: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VlanSyncConfig {
    #[serde(flatten)]
    pub options: EntityOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CableSyncConfig {
    #[serde(flatten)]
    pub options: EntityOptions,

    /// Neighbor identity types allowed to resolve a peer device.
    #[serde(default = "default_identity_types")]
    pub identity_types: Vec<IdentityType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySyncConfig {
    #[serde(flatten)]
    pub options: EntityOptions,
}

/// Complete nbsync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub devices: DeviceSyncConfig,
    #[serde(default)]
    pub interfaces: InterfaceSyncConfig,
    #[serde(default)]
    pub ip_addresses: IpSyncConfig,
    #[serde(default)]
    pub vlans: VlanSyncConfig,
    #[serde(default)]
    pub cables: CableSyncConfig,
    #[serde(default)]
    pub inventory: InventorySyncConfig,
}

// Default functions
fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_identity_types() -> Vec<IdentityType> {
    vec![IdentityType::Hostname, IdentityType::Mac, IdentityType::Ip]
}

// Default implementations
impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            cleanup: false,
            concurrency: default_concurrency(),
        }
    }
}

impl Default for EntityOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            create_missing: true,
            update_existing: true,
            cleanup: None,
            fields: BTreeMap::new(),
            defaults: BTreeMap::new(),
        }
    }
}

impl Default for InterfaceSyncConfig {
    fn default() -> Self {
        Self {
            options: EntityOptions::default(),
            enabled_mode: EnabledMode::default(),
            sync_vlans: true,
            auto_type: true,
            exclude_interfaces: Vec::new(),
            mac_policy: MacPolicy::default(),
        }
    }
}

impl Default for IpSyncConfig {
    fn default() -> Self {
        Self {
            options: EntityOptions::default(),
            set_primary: true,
        }
    }
}

impl Default for CableSyncConfig {
    fn default() -> Self {
        Self {
            options: EntityOptions::default(),
            identity_types: default_identity_types(),
        }
    }
}

impl EntityOptions {
    /// Returns true unless the field is explicitly switched off.
    pub fn field_enabled(&self, field: &str) -> bool {
        self.fields.get(field).copied().unwrap_or(true)
    }

    /// Filters `candidates` down to the enabled fields.
    pub fn enabled_fields(&self, candidates: &[&str]) -> Vec<String> {
        candidates
            .iter()
            .filter(|f| self.field_enabled(f))
            .map(|f| f.to_string())
            .collect()
    }

    pub fn default_value(&self, key: &str) -> Option<&str> {
        self.defaults.get(key).map(String::as_str)
    }
}

impl InterfaceSyncConfig {
    /// Compiles `exclude_interfaces`.
    pub fn excludes(&self) -> ConfigResult<ExcludeSet> {
        ExcludeSet::new(self.exclude_interfaces.as_slice()).map_err(|e| {
            ConfigError::invalid("interfaces.exclude_interfaces", e.to_string())
        })
    }
}

impl SyncConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::parse("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = toml::from_str(&content)
                    .map_err(|e| ConfigError::parse(path.display().to_string(), e.to_string()))?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Saves configuration to file.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid("<root>", format!("failed to serialize: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validates configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.general.concurrency == 0 {
            return Err(ConfigError::invalid("general.concurrency", "must be > 0"));
        }

        self.interfaces.excludes()?;

        if self.cables.identity_types.contains(&IdentityType::Unknown) {
            return Err(ConfigError::invalid(
                "cables.identity_types",
                "\"unknown\" cannot resolve a device",
            ));
        }

        Ok(())
    }

    /// Effective cleanup flag for an entity.
    pub fn cleanup_for(&self, options: &EntityOptions) -> bool {
        options.cleanup.unwrap_or(self.general.cleanup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.general.dry_run);
        assert!(!config.general.cleanup);
        assert_eq!(config.general.concurrency, 4);
        assert_eq!(config.interfaces.enabled_mode, EnabledMode::Admin);
        assert!(config.interfaces.sync_vlans);
        assert_eq!(config.interfaces.mac_policy, MacPolicy::Always);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_absent_field_is_compared() {
        let config = SyncConfig::from_toml_str(
            r#"
[interfaces.fields]
mtu = false
"#,
        )
        .unwrap();
        let options = &config.interfaces.options;
        assert!(!options.field_enabled("mtu"));
        assert!(options.field_enabled("description"));
        assert_eq!(
            options.enabled_fields(&["description", "mtu", "speed"]),
            vec!["description", "speed"]
        );
    }

    #[test]
    fn test_toml_deserialization() {
        let config = SyncConfig::from_toml_str(
            r#"
[general]
dry_run = true
concurrency = 8

[interfaces]
enabled_mode = "link"
create_missing = false
exclude_interfaces = ["^Vlan1$"]
mac_policy = "with_ip"

[devices.defaults]
site = "lab"

[cables]
cleanup = true
identity_types = ["hostname"]
"#,
        )
        .unwrap();

        assert!(config.general.dry_run);
        assert_eq!(config.general.concurrency, 8);
        assert_eq!(config.interfaces.enabled_mode, EnabledMode::Link);
        assert!(!config.interfaces.options.create_missing);
        assert!(config.interfaces.options.update_existing);
        assert_eq!(config.interfaces.mac_policy, MacPolicy::WithIp);
        assert_eq!(config.devices.options.default_value("site"), Some("lab"));
        assert!(config.cleanup_for(&config.cables.options));
        assert!(!config.cleanup_for(&config.vlans.options));
        assert_eq!(config.cables.identity_types, vec![IdentityType::Hostname]);
    }

    #[test]
    fn test_administrative_alias() {
        let config = SyncConfig::from_toml_str("[interfaces]\nenabled_mode = \"administrative\"\n").unwrap();
        assert_eq!(config.interfaces.enabled_mode, EnabledMode::Admin);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SyncConfig::from_toml_str("[general]\nconcurrency = 0\n").is_err());
        assert!(SyncConfig::from_toml_str("[interfaces]\nexclude_interfaces = [\"(\"]\n").is_err());
        assert!(SyncConfig::from_toml_str("[cables]\nidentity_types = [\"unknown\"]\n").is_err());
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = SyncConfig::load_or_default("/nonexistent/nbsync.toml").unwrap();
        assert_eq!(config.general.concurrency, 4);
    }

    #[test]
    fn test_load_and_save_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[general]\ncleanup = true").unwrap();
        let config = SyncConfig::load_or_default(file.path()).unwrap();
        assert!(config.general.cleanup);

        let out = tempfile::NamedTempFile::new().unwrap();
        config.save(out.path()).unwrap();
        let reloaded = SyncConfig::load_or_default(out.path()).unwrap();
        assert!(reloaded.general.cleanup);
    }
}
