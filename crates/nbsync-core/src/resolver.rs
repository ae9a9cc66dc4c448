//! Get-or-create for reference entities (site, role, manufacturer, ...).

use tracing::{info, warn};

use crate::cache::DirectoryCache;
use crate::directory::Directory;
use crate::record::{EntityKind, Payload, Query, RemoteRecord};

/// Converts a display name into a directory slug.
///
/// ```
/// use nbsync_core::slugify;
///
/// assert_eq!(slugify("Cisco Systems, Inc."), "cisco-systems-inc");
/// assert_eq!(slugify("  Core  Switch "), "core-switch");
/// ```
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut dash = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !slug.is_empty() {
            slug.push('-');
            dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Resolves reference entities, creating them when missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
    dry_run: bool,
}

impl Resolver {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Looks a reference entity up by slug, then by name, and creates it only
    /// if both fail.
    ///
    /// `extra` is merged into the create payload (e.g. the manufacturer of a
    /// device type). Returns `None` if the lookup or the create fails; callers
    /// skip whatever depended on the reference. In a dry run a placeholder
    /// record stands in for the one that would be created.
    pub async fn resolve_or_create(
        &self,
        directory: &dyn Directory,
        cache: &mut DirectoryCache,
        kind: EntityKind,
        name: &str,
        extra: Payload,
    ) -> Option<RemoteRecord> {
        let name = name.trim();
        let slug = slugify(name);
        if slug.is_empty() {
            return None;
        }
        if let Some(found) = cache.reference(kind, &slug) {
            return Some(found.clone());
        }

        let name_field = name_field(kind);
        let lookups = [
            Query::new().eq("slug", slug.as_str()),
            Query::new().ieq(name_field, name),
        ];
        for query in &lookups {
            match directory.get_one(kind, query).await {
                Ok(Some(found)) => {
                    cache.remember_reference(kind, &slug, found.clone());
                    return Some(found);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(%kind, name, error = %e, "reference lookup failed");
                    return None;
                }
            }
        }

        let mut payload = extra;
        payload.insert(name_field.into(), name.into());
        payload.insert("slug".into(), slug.as_str().into());

        if self.dry_run {
            info!(%kind, name, "dry run, would create reference");
            let placeholder = RemoteRecord::placeholder(payload);
            cache.remember_reference(kind, &slug, placeholder.clone());
            return Some(placeholder);
        }

        match directory.create(kind, payload).await {
            Ok(created) => {
                info!(%kind, name, id = created.id(), "created reference");
                cache.remember_reference(kind, &slug, created.clone());
                Some(created)
            }
            Err(e) => {
                warn!(%kind, name, error = %e, "failed to create reference");
                None
            }
        }
    }
}

fn name_field(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::DeviceType => "model",
        _ => "name",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{CallOp, MemoryDirectory};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_finds_by_slug_then_name() {
        let dir = MemoryDirectory::new();
        let by_slug = dir.seed(EntityKind::Site, json!({"name": "DC One", "slug": "dc-one"}));
        let by_name = dir.seed(EntityKind::DeviceRole, json!({"name": "Leaf", "slug": "leaf-switch"}));
        let mut cache = DirectoryCache::new();
        let resolver = Resolver::new(false);

        let site = resolver
            .resolve_or_create(&dir, &mut cache, EntityKind::Site, "DC One", Payload::new())
            .await;
        assert_eq!(site.map(|r| r.id()), Some(by_slug));

        let role = resolver
            .resolve_or_create(&dir, &mut cache, EntityKind::DeviceRole, "leaf", Payload::new())
            .await;
        assert_eq!(role.map(|r| r.id()), Some(by_name));
        assert!(dir.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_creates_once_and_memoizes() {
        let dir = MemoryDirectory::new();
        let mut cache = DirectoryCache::new();
        let resolver = Resolver::new(false);

        for _ in 0..3 {
            let r = resolver
                .resolve_or_create(&dir, &mut cache, EntityKind::Manufacturer, "Arista", Payload::new())
                .await;
            assert!(r.is_some());
        }
        assert_eq!(dir.call_count(CallOp::Create, EntityKind::Manufacturer), 1);
        assert_eq!(dir.call_count(CallOp::Filter, EntityKind::Manufacturer), 2);
    }

    #[tokio::test]
    async fn test_create_failure_returns_none() {
        let dir = MemoryDirectory::new();
        let mut cache = DirectoryCache::new();
        // Device types need a manufacturer; none is supplied.
        let r = Resolver::new(false)
            .resolve_or_create(&dir, &mut cache, EntityKind::DeviceType, "DCS-7050", Payload::new())
            .await;
        assert!(r.is_none());
    }

    #[tokio::test]
    async fn test_dry_run_returns_placeholder() {
        let dir = MemoryDirectory::new();
        let mut cache = DirectoryCache::new();
        let r = Resolver::new(true)
            .resolve_or_create(&dir, &mut cache, EntityKind::Tenant, "Ops", Payload::new())
            .await;
        assert!(r.map(|r| r.is_placeholder()).unwrap_or(false));
        assert!(dir.mutating_calls().is_empty());
    }
}
