//! Per-run memoization of directory lookups.
//!
//! Every map is filled lazily on first miss and never invalidated during a
//! run; the run assumes nobody else mutates the directory concurrently.
//! Transport errors are logged and read as "not found". Failed lookups are
//! not memoized.

use nbsync_types::iface::{canonical_name, is_lag_name, names_match};
use nbsync_types::MacAddress;
use serde_json::Value;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, warn};

use crate::directory::Directory;
use crate::record::{ref_id_of, EntityKind, Payload, Query, RecordId, RemoteRecord};

/// Hit and miss counters, for tests and debug logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Lookup cache owned by one orchestrator for one run.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    /// Devices by name; `None` memoizes a confirmed miss.
    devices_by_name: HashMap<String, Option<RemoteRecord>>,
    /// Devices by hardware or network address.
    devices_by_address: HashMap<String, Option<RemoteRecord>>,
    /// VLANs by site (None = global) and tag.
    vlans_by_site: HashMap<Option<RecordId>, HashMap<u16, RemoteRecord>>,
    /// Reverse map: VLAN record id → tag.
    vlan_tags: HashMap<RecordId, u16>,
    /// Interfaces by device id and name.
    interfaces_by_device: HashMap<RecordId, HashMap<String, RemoteRecord>>,
    /// Reference entities by kind and slug.
    references: HashMap<(EntityKind, String), RemoteRecord>,
    stats: CacheStats,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    // ============ Devices ============

    /// Finds a device by name.
    pub async fn find_device(&mut self, directory: &dyn Directory, name: &str) -> Option<RemoteRecord> {
        if let Some(cached) = self.devices_by_name.get(name) {
            self.stats.hits += 1;
            return cached.clone();
        }
        self.stats.misses += 1;
        match directory.get_by_name(EntityKind::Device, name).await {
            Ok(found) => {
                self.devices_by_name.insert(name.to_string(), found.clone());
                found
            }
            Err(e) => {
                warn!(device = name, error = %e, "device lookup failed");
                None
            }
        }
    }

    /// Finds a device by one of its hardware or network addresses.
    ///
    /// A MAC address is matched against interface hardware addresses; an IP
    /// address against IP records, following the assigned interface.
    pub async fn find_device_by_address(
        &mut self,
        directory: &dyn Directory,
        address: &str,
    ) -> Option<RemoteRecord> {
        let key = address.trim().to_ascii_lowercase();
        if let Some(cached) = self.devices_by_address.get(&key) {
            self.stats.hits += 1;
            return cached.clone();
        }
        self.stats.misses += 1;

        let result = if let Ok(mac) = key.parse::<MacAddress>() {
            self.device_by_mac(directory, mac).await
        } else if let Some(ip) = key.split('/').next().and_then(|s| s.parse::<IpAddr>().ok()) {
            self.device_by_ip(directory, ip).await
        } else {
            debug!(address, "not a hardware or network address");
            Ok(None)
        };

        match result {
            Ok(found) => {
                if let Some(device) = &found {
                    if let Some(name) = device.name() {
                        self.devices_by_name
                            .insert(name.to_string(), Some(device.clone()));
                    }
                }
                self.devices_by_address.insert(key, found.clone());
                found
            }
            Err(e) => {
                warn!(address, error = %e, "device lookup by address failed");
                None
            }
        }
    }

    async fn device_by_mac(
        &self,
        directory: &dyn Directory,
        mac: MacAddress,
    ) -> crate::DirectoryResult<Option<RemoteRecord>> {
        let query = Query::new().ieq("mac_address", &mac.to_string());
        let Some(iface) = directory.get_one(EntityKind::Interface, &query).await? else {
            return Ok(None);
        };
        match iface.ref_id("device") {
            Some(id) => directory.get(EntityKind::Device, id).await,
            None => Ok(None),
        }
    }

    async fn device_by_ip(
        &self,
        directory: &dyn Directory,
        ip: IpAddr,
    ) -> crate::DirectoryResult<Option<RemoteRecord>> {
        let query = Query::new().address("address", ip);
        let Some(record) = directory.get_one(EntityKind::IpAddress, &query).await? else {
            return Ok(None);
        };
        let Some(iface_id) = record.ref_id("interface") else {
            return Ok(None);
        };
        let Some(iface) = directory.get(EntityKind::Interface, iface_id).await? else {
            return Ok(None);
        };
        match iface.ref_id("device") {
            Some(id) => directory.get(EntityKind::Device, id).await,
            None => Ok(None),
        }
    }

    /// Registers a device created or updated during this run.
    pub fn remember_device(&mut self, device: RemoteRecord) {
        if let Some(name) = device.name() {
            self.devices_by_name.insert(name.to_string(), Some(device));
        }
    }

    // ============ VLANs ============

    /// Loads every VLAN of a site with one bulk fetch, filling the forward and
    /// reverse maps. Later calls for the same site are free.
    pub async fn warm_vlans(&mut self, directory: &dyn Directory, site: Option<RecordId>) {
        if self.vlans_by_site.contains_key(&site) {
            return;
        }
        let query = Query::new().eq("site", site.map(Value::from).unwrap_or(Value::Null));
        match directory.filter(EntityKind::Vlan, &query).await {
            Ok(vlans) => {
                debug!(?site, count = vlans.len(), "warmed VLAN cache");
                let mut by_tag = HashMap::with_capacity(vlans.len());
                for vlan in vlans {
                    if let Some(tag) = vlan_tag_of(&vlan) {
                        self.vlan_tags.insert(vlan.id(), tag);
                        by_tag.insert(tag, vlan);
                    }
                }
                self.vlans_by_site.insert(site, by_tag);
            }
            Err(e) => warn!(?site, error = %e, "VLAN fetch failed"),
        }
    }

    /// Finds a VLAN by tag within a site.
    pub async fn find_vlan(
        &mut self,
        directory: &dyn Directory,
        tag: u16,
        site: Option<RecordId>,
    ) -> Option<RemoteRecord> {
        if !self.vlans_by_site.contains_key(&site) {
            self.stats.misses += 1;
            self.warm_vlans(directory, site).await;
        } else {
            self.stats.hits += 1;
        }
        self.vlans_by_site
            .get(&site)
            .and_then(|m| m.get(&tag))
            .cloned()
    }

    /// Returns the cached VLANs of a site, if the site was warmed.
    pub fn site_vlans(&self, site: Option<RecordId>) -> Option<&HashMap<u16, RemoteRecord>> {
        self.vlans_by_site.get(&site)
    }

    /// Returns the tag of a VLAN reference.
    ///
    /// The reverse map is consulted first, then a `vid` carried by the nested
    /// reference itself; only then is the VLAN fetched, and the answer kept.
    pub async fn vlan_tag(&mut self, directory: &dyn Directory, vlan_ref: &Value) -> Option<u16> {
        let id = ref_id_of(vlan_ref)?;
        if let Some(tag) = self.vlan_tags.get(&id) {
            self.stats.hits += 1;
            return Some(*tag);
        }
        if let Some(tag) = vlan_ref
            .get("vid")
            .and_then(Value::as_u64)
            .and_then(|v| u16::try_from(v).ok())
        {
            self.vlan_tags.insert(id, tag);
            return Some(tag);
        }
        self.stats.misses += 1;
        match directory.get(EntityKind::Vlan, id).await {
            Ok(Some(vlan)) => {
                let tag = vlan_tag_of(&vlan)?;
                self.vlan_tags.insert(id, tag);
                Some(tag)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(vlan = id, error = %e, "VLAN fetch failed");
                None
            }
        }
    }

    /// Resolves the tags of every VLAN reference in `refs` into the reverse
    /// map.
    pub async fn resolve_vlan_tags<'a, I>(&mut self, directory: &dyn Directory, refs: I)
    where
        I: IntoIterator<Item = &'a Value>,
    {
        for vlan_ref in refs {
            let _ = self.vlan_tag(directory, vlan_ref).await;
        }
    }

    /// Returns a tag from the reverse map without touching the directory.
    pub fn cached_vlan_tag(&self, id: RecordId) -> Option<u16> {
        self.vlan_tags.get(&id).copied()
    }

    /// Returns a snapshot of the reverse map.
    pub fn vlan_tags(&self) -> &HashMap<RecordId, u16> {
        &self.vlan_tags
    }

    /// Registers a VLAN created or updated during this run.
    pub fn remember_vlan(&mut self, site: Option<RecordId>, vlan: RemoteRecord) {
        if let Some(tag) = vlan_tag_of(&vlan) {
            if !vlan.is_placeholder() {
                self.vlan_tags.insert(vlan.id(), tag);
            }
            self.vlans_by_site.entry(site).or_default().insert(tag, vlan);
        }
    }

    // ============ Interfaces ============

    /// Returns every interface of a device, fetched once per run.
    pub async fn device_interfaces(
        &mut self,
        directory: &dyn Directory,
        device_id: RecordId,
    ) -> Vec<RemoteRecord> {
        self.load_interfaces(directory, device_id).await;
        self.interfaces_by_device
            .get(&device_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn load_interfaces(&mut self, directory: &dyn Directory, device_id: RecordId) {
        if self.interfaces_by_device.contains_key(&device_id) {
            self.stats.hits += 1;
            return;
        }
        self.stats.misses += 1;
        let query = Query::new().eq("device", device_id);
        match directory.filter(EntityKind::Interface, &query).await {
            Ok(interfaces) => {
                let by_name = interfaces
                    .into_iter()
                    .filter_map(|i| i.name().map(|n| (n.to_string(), i.clone())))
                    .collect();
                self.interfaces_by_device.insert(device_id, by_name);
            }
            Err(e) => warn!(device = device_id, error = %e, "interface fetch failed"),
        }
    }

    /// Finds an interface of a device by name.
    ///
    /// Tries an exact match, then abbreviation-insensitive matching
    /// (`Gi0/1` ≡ `GigabitEthernet0/1`), then a case-insensitive match for
    /// LAG names.
    pub async fn find_interface(
        &mut self,
        directory: &dyn Directory,
        device_id: RecordId,
        name: &str,
    ) -> Option<RemoteRecord> {
        self.load_interfaces(directory, device_id).await;
        self.cached_interface(device_id, name)
    }

    /// Same as [`find_interface`](Self::find_interface) but never fetches.
    pub fn cached_interface(&self, device_id: RecordId, name: &str) -> Option<RemoteRecord> {
        let interfaces = self.interfaces_by_device.get(&device_id)?;
        if let Some(found) = interfaces.get(name) {
            return Some(found.clone());
        }
        if let Some(found) = interfaces
            .iter()
            .find(|(n, _)| names_match(n, name))
            .map(|(_, r)| r)
        {
            return Some(found.clone());
        }
        if is_lag_name(name) {
            let lower = canonical_name(name).to_ascii_lowercase();
            return interfaces
                .iter()
                .find(|(n, _)| canonical_name(n).to_ascii_lowercase() == lower)
                .map(|(_, r)| r.clone());
        }
        None
    }

    /// Registers an interface created during this run.
    pub fn remember_interface(&mut self, device_id: RecordId, interface: RemoteRecord) {
        if let Some(name) = interface.name() {
            let name = name.to_string();
            self.interfaces_by_device
                .entry(device_id)
                .or_default()
                .insert(name, interface);
        }
    }

    /// Applies updated attributes to a cached interface.
    pub fn apply_interface_changes(&mut self, device_id: RecordId, name: &str, changes: &Payload) {
        if let Some(existing) = self
            .interfaces_by_device
            .get_mut(&device_id)
            .and_then(|m| m.get_mut(name))
        {
            existing.merge(changes);
        }
    }

    /// Drops an interface deleted during this run.
    pub fn forget_interface(&mut self, device_id: RecordId, name: &str) {
        if let Some(entry) = self.interfaces_by_device.get_mut(&device_id) {
            entry.remove(name);
        }
    }

    // ============ References ============

    pub fn reference(&self, kind: EntityKind, slug: &str) -> Option<&RemoteRecord> {
        self.references.get(&(kind, slug.to_string()))
    }

    pub fn remember_reference(&mut self, kind: EntityKind, slug: &str, record: RemoteRecord) {
        self.references.insert((kind, slug.to_string()), record);
    }
}

fn vlan_tag_of(vlan: &RemoteRecord) -> Option<u16> {
    vlan.int("vid").and_then(|v| u16::try_from(v).ok())
}
