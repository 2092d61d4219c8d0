// Point-in-time index over the persisted catalog.
//
// Built once per run from a `CatalogSnapshot` and never mutated afterwards;
// the diff engine expresses every change as a `DiffResult` entry instead.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::types::{
    CatalogSnapshot, LegacyDependency, Package, PackageId, PackageUrl, Url, UrlId, UrlKey, UrlType,
};

#[derive(Debug, Default)]
pub struct Cache {
    package_map: HashMap<String, Package>,
    url_map: HashMap<UrlKey, Url>,
    package_urls: HashMap<PackageId, HashMap<UrlId, PackageUrl>>,
    dependencies: HashMap<PackageId, HashMap<PackageId, LegacyDependency>>,
}

impl Cache {
    /// Index all four mappings in one pass over the snapshot.
    pub fn build(snapshot: CatalogSnapshot) -> Self {
        let mut cache = Self::default();

        for package in snapshot.packages {
            if let Some(previous) = cache.package_map.insert(package.import_id.clone(), package) {
                warn!(import_id = %previous.import_id, "Duplicate import_id in snapshot, keeping last");
            }
        }
        for url in snapshot.urls {
            cache.url_map.insert(url.key(), url);
        }
        for link in snapshot.package_urls {
            cache
                .package_urls
                .entry(link.package_id)
                .or_default()
                .insert(link.url_id, link);
        }
        for dep in snapshot.dependencies {
            cache
                .dependencies
                .entry(dep.package_id)
                .or_default()
                .insert(dep.dependency_id, dep);
        }

        info!(
            packages = cache.package_map.len(),
            urls = cache.url_map.len(),
            linked_packages = cache.package_urls.len(),
            dependents = cache.dependencies.len(),
            "Built catalog cache"
        );
        cache
    }

    pub fn lookup_package(&self, import_id: &str) -> Option<&Package> {
        self.package_map.get(import_id)
    }

    pub fn lookup_url(&self, url: &str, url_type: UrlType) -> Option<&Url> {
        // HashMap<UrlKey, _> cannot be looked up with borrowed parts.
        self.url_map.get(&UrlKey::new(url, url_type))
    }

    pub fn lookup_url_key(&self, key: &UrlKey) -> Option<&Url> {
        self.url_map.get(key)
    }

    /// Links of a package, keyed by URL id.
    pub fn urls_of(&self, package_id: PackageId) -> Option<&HashMap<UrlId, PackageUrl>> {
        self.package_urls.get(&package_id)
    }

    /// Outgoing edges of a package, keyed by dependency id.
    pub fn dependencies_of(
        &self,
        package_id: PackageId,
    ) -> Option<&HashMap<PackageId, LegacyDependency>> {
        self.dependencies.get(&package_id)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.package_map.values()
    }

    /// Every cached edge, in no particular order.
    pub fn all_dependencies(&self) -> impl Iterator<Item = &LegacyDependency> {
        self.dependencies.values().flat_map(HashMap::values)
    }

    pub fn package_count(&self) -> usize {
        self.package_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.package_map.is_empty()
    }
}
