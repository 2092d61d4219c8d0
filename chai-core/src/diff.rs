// Diff engine: compares a normalized batch against the catalog cache and
// produces insert/update/delete sets for each entity kind.
//
// The engine never mutates the cache. Everything it decides lands in a
// `DiffResult`, which a `CatalogStore` applies in `EntityKind::APPLY_ORDER`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chai_registries::NormalizedPackage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::error::{ChaiError, DiffError, Result};
use crate::reconcile::DependencyReconciler;
use crate::types::{
    DependencyId, EdgeKey, EntityKind, LegacyDependency, Package, PackageId, PackageUrl,
    PackageUrlId, Url, UrlId, UrlKey,
};

// ── Result types ───────────────────────────────────────────────────

/// Insert, update and delete sets for one entity kind, keyed by identity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDiff<K: Ord, V> {
    pub insert: BTreeMap<K, V>,
    pub update: BTreeMap<K, V>,
    pub delete: BTreeMap<K, V>,
}

impl<K: Ord, V> Default for EntityDiff<K, V> {
    fn default() -> Self {
        Self {
            insert: BTreeMap::new(),
            update: BTreeMap::new(),
            delete: BTreeMap::new(),
        }
    }
}

impl<K: Ord, V> EntityDiff<K, V> {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.insert.len() + self.update.len() + self.delete.len()
    }

    /// No key appears in more than one of the three sets.
    pub fn is_disjoint(&self) -> bool {
        let Self {
            insert,
            update,
            delete,
        } = self;
        !insert.keys().any(|k| update.contains_key(k) || delete.contains_key(k))
            && !update.keys().any(|k| delete.contains_key(k))
    }

    fn counts(&self) -> ChangeCounts {
        ChangeCounts {
            insert: self.insert.len(),
            update: self.update.len(),
            delete: self.delete.len(),
        }
    }
}

/// Change-set for one batch.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// Keyed by `import_id`.
    pub packages: EntityDiff<String, Package>,
    pub urls: EntityDiff<UrlKey, Url>,
    pub package_urls: EntityDiff<(PackageId, UrlId), PackageUrl>,
    pub dependencies: EntityDiff<EdgeKey, LegacyDependency>,
    /// Per-record failures, labelled by `import_id` or record position.
    pub errors: Vec<(String, ChaiError)>,
    /// Dependency names that matched neither the cache nor the batch.
    pub unresolved_dependencies: usize,
}

impl DiffResult {
    /// True when applying the result would not change the catalog.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
            && self.urls.is_empty()
            && self.package_urls.is_empty()
            && self.dependencies.is_empty()
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            packages: self.packages.counts(),
            urls: self.urls.counts(),
            package_urls: self.package_urls.counts(),
            dependencies: self.dependencies.counts(),
            errors: self.errors.len(),
            unresolved_dependencies: self.unresolved_dependencies,
        }
    }

    pub fn counts(&self, kind: EntityKind) -> ChangeCounts {
        match kind {
            EntityKind::Package => self.packages.counts(),
            EntityKind::Url => self.urls.counts(),
            EntityKind::PackageUrl => self.package_urls.counts(),
            EntityKind::Dependency => self.dependencies.counts(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub insert: usize,
    pub update: usize,
    pub delete: usize,
}

/// Serializable counts of a [`DiffResult`], for logs and run statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub packages: ChangeCounts,
    pub urls: ChangeCounts,
    pub package_urls: ChangeCounts,
    pub dependencies: ChangeCounts,
    pub errors: usize,
    pub unresolved_dependencies: usize,
}

// ── Engine ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Delete cached packages that the batch does not mention.
    pub full_reconciliation: bool,
    /// Import ids that full reconciliation must never retire: records of the
    /// batch that failed before reaching the engine.
    pub protected: HashSet<String>,
    /// Timestamp stamped on every inserted or updated row.
    pub now: DateTime<Utc>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            full_reconciliation: false,
            protected: HashSet::new(),
            now: Utc::now(),
        }
    }
}

/// All records of the batch that share one `import_id`.
struct PackageGroup<'b> {
    head: &'b NormalizedPackage,
    members: Vec<&'b NormalizedPackage>,
}

impl PackageGroup<'_> {
    fn url_keys(&self) -> BTreeSet<UrlKey> {
        self.members
            .iter()
            .flat_map(|m| m.urls.iter().map(UrlKey::from))
            .collect()
    }
}

#[derive(Debug)]
pub struct DiffEngine<'a> {
    cache: &'a Cache,
    options: DiffOptions,
}

impl<'a> DiffEngine<'a> {
    pub fn new(cache: &'a Cache, options: DiffOptions) -> Self {
        Self { cache, options }
    }

    /// Diff `batch` against the cache.
    ///
    /// Fails only when the batch is empty. Record-level problems are collected
    /// in [`DiffResult::errors`] and the offending record is left out.
    pub fn diff(&self, batch: &[NormalizedPackage]) -> Result<DiffResult> {
        if batch.is_empty() {
            return Err(DiffError::EmptyBatch.into());
        }

        let mut result = DiffResult::default();
        let groups = self.group_records(batch, &mut result.errors);
        // A rejected record still names a live package.
        let rejected: HashSet<String> = result.errors.iter().map(|(id, _)| id.clone()).collect();
        let (resolved, retired) = self.diff_packages(&groups, &rejected, &mut result);
        self.diff_links(&groups, &resolved, &retired, &mut result);
        self.diff_dependencies(&groups, &resolved, &retired, &mut result);

        debug_assert!(result.packages.is_disjoint());
        debug_assert!(result.package_urls.is_disjoint());
        debug_assert!(result.dependencies.is_disjoint());

        let summary = result.summary();
        info!(
            records = batch.len(),
            packages = ?summary.packages,
            urls = summary.urls.insert,
            package_urls = ?summary.package_urls,
            dependencies = ?summary.dependencies,
            unresolved = summary.unresolved_dependencies,
            errors = summary.errors,
            "Diffed batch against catalog"
        );
        Ok(result)
    }

    /// Group records by `import_id`, rejecting any that conflict with the
    /// first record for that id or with the cached package.
    fn group_records<'b>(
        &self,
        batch: &'b [NormalizedPackage],
        errors: &mut Vec<(String, ChaiError)>,
    ) -> Vec<PackageGroup<'b>> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<PackageGroup<'b>> = Vec::new();

        for record in batch {
            if let Some(cached) = self.cache.lookup_package(&record.import_id) {
                if cached.registry != record.registry {
                    let reason = format!(
                        "cached under registry {}, batch claims {}",
                        cached.registry, record.registry
                    );
                    reject(record, reason, errors);
                    continue;
                }
            }

            match index.get(record.import_id.as_str()) {
                Some(&i) => {
                    if let Some(reason) = conflict_reason(groups[i].head, record) {
                        reject(record, reason, errors);
                        continue;
                    }
                    groups[i].members.push(record);
                }
                None => {
                    index.insert(&record.import_id, groups.len());
                    groups.push(PackageGroup {
                        head: record,
                        members: vec![record],
                    });
                }
            }
        }
        groups
    }

    /// Returns the `import_id → PackageId` resolution table (cache plus new
    /// inserts, minus retired packages) and the retired package ids.
    fn diff_packages(
        &self,
        groups: &[PackageGroup<'_>],
        rejected: &HashSet<String>,
        result: &mut DiffResult,
    ) -> (HashMap<String, PackageId>, HashSet<PackageId>) {
        let now = self.options.now;
        let in_batch: HashSet<&str> = groups
            .iter()
            .map(|g| g.head.import_id.as_str())
            .chain(rejected.iter().map(String::as_str))
            .chain(self.options.protected.iter().map(String::as_str))
            .collect();

        let mut resolved = HashMap::with_capacity(self.cache.package_count() + groups.len());
        let mut retired = HashSet::new();
        for cached in self.cache.packages() {
            if self.options.full_reconciliation && !in_batch.contains(cached.import_id.as_str()) {
                retired.insert(cached.id);
                result
                    .packages
                    .delete
                    .insert(cached.import_id.clone(), cached.clone());
            } else {
                resolved.insert(cached.import_id.clone(), cached.id);
            }
        }

        for group in groups {
            let incoming = group.head;
            match self.cache.lookup_package(&incoming.import_id) {
                Some(cached) => {
                    let candidate = to_package(incoming, cached.id, cached.created_at, now);
                    if cached.tracked_differs(&candidate) {
                        result
                            .packages
                            .update
                            .insert(incoming.import_id.clone(), candidate);
                    }
                }
                None => {
                    let package = to_package(incoming, PackageId::new_v4(), now, now);
                    resolved.insert(incoming.import_id.clone(), package.id);
                    result
                        .packages
                        .insert
                        .insert(incoming.import_id.clone(), package);
                }
            }
        }

        if !retired.is_empty() {
            info!(retired = retired.len(), "Full reconciliation retires packages");
        }
        (resolved, retired)
    }

    fn diff_links(
        &self,
        groups: &[PackageGroup<'_>],
        resolved: &HashMap<String, PackageId>,
        retired: &HashSet<PackageId>,
        result: &mut DiffResult,
    ) {
        let now = self.options.now;

        for group in groups {
            let Some(&package_id) = resolved.get(&group.head.import_id) else {
                continue;
            };

            let mut wanted: BTreeSet<UrlId> = BTreeSet::new();
            for key in group.url_keys() {
                let url_id = if let Some(url) = self.cache.lookup_url_key(&key) {
                    url.id
                } else if let Some(url) = result.urls.insert.get(&key) {
                    url.id
                } else {
                    let url = Url {
                        id: UrlId::new_v4(),
                        url: key.url.clone(),
                        url_type: key.url_type,
                        created_at: now,
                    };
                    let id = url.id;
                    result.urls.insert.insert(key, url);
                    id
                };
                wanted.insert(url_id);
            }

            let cached = self.cache.urls_of(package_id);
            for &url_id in &wanted {
                if cached.is_some_and(|links| links.contains_key(&url_id)) {
                    continue;
                }
                result.package_urls.insert.insert(
                    (package_id, url_id),
                    PackageUrl {
                        id: PackageUrlId::new_v4(),
                        package_id,
                        url_id,
                        created_at: now,
                    },
                );
            }
            for (url_id, link) in cached.into_iter().flatten() {
                if !wanted.contains(url_id) {
                    result.package_urls.delete.insert(link.key(), link.clone());
                }
            }
        }

        for &package_id in retired {
            for link in self.cache.urls_of(package_id).into_iter().flat_map(HashMap::values) {
                result.package_urls.delete.insert(link.key(), link.clone());
            }
        }
    }

    fn diff_dependencies(
        &self,
        groups: &[PackageGroup<'_>],
        resolved: &HashMap<String, PackageId>,
        retired: &HashSet<PackageId>,
        result: &mut DiffResult,
    ) {
        let now = self.options.now;

        let mut reconciler = DependencyReconciler::new();
        for member in groups.iter().flat_map(|g| &g.members) {
            reconciler.add_package(member);
        }

        for group in groups {
            let import_id = group.head.import_id.as_str();
            let Some(&package_id) = resolved.get(import_id) else {
                continue;
            };

            let mut wanted = BTreeMap::new();
            for (name, &dep_type) in reconciler.canonical(import_id).into_iter().flatten() {
                match resolved.get(name) {
                    Some(&dependency_id) => {
                        wanted.insert(dependency_id, dep_type);
                    }
                    None => {
                        debug!(package = import_id, dependency = %name, "Dependency not in catalog, skipping");
                        result.unresolved_dependencies += 1;
                    }
                }
            }

            let cached = self.cache.dependencies_of(package_id);
            for (&dependency_id, &dep_type) in &wanted {
                let key = EdgeKey {
                    package_id,
                    dependency_id,
                };
                match cached.and_then(|edges| edges.get(&dependency_id)) {
                    Some(existing) if existing.dependency_type == dep_type => {}
                    Some(existing) => {
                        result.dependencies.update.insert(
                            key,
                            LegacyDependency {
                                dependency_type: dep_type,
                                updated_at: now,
                                ..existing.clone()
                            },
                        );
                    }
                    None => {
                        result.dependencies.insert.insert(
                            key,
                            LegacyDependency {
                                id: DependencyId::new_v4(),
                                package_id,
                                dependency_id,
                                dependency_type: dep_type,
                                created_at: now,
                                updated_at: now,
                            },
                        );
                    }
                }
            }
            for (dependency_id, edge) in cached.into_iter().flatten() {
                if !wanted.contains_key(dependency_id) {
                    result.dependencies.delete.insert(edge.key(), edge.clone());
                }
            }
        }

        // Edges into retired packages from batch packages already fall out of
        // the set difference above. Outgoing edges of retired packages go here.
        for &package_id in retired {
            for edge in self
                .cache
                .dependencies_of(package_id)
                .into_iter()
                .flat_map(HashMap::values)
            {
                result.dependencies.delete.insert(edge.key(), edge.clone());
            }
        }
    }
}

/// Convenience wrapper: diff `batch` against `cache` with `options`.
pub fn diff(cache: &Cache, batch: &[NormalizedPackage], options: DiffOptions) -> Result<DiffResult> {
    DiffEngine::new(cache, options).diff(batch)
}

fn to_package(
    incoming: &NormalizedPackage,
    id: PackageId,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Package {
    Package {
        id,
        registry: incoming.registry,
        import_id: incoming.import_id.clone(),
        derived_id: incoming.derived_id.clone(),
        name: incoming.name.clone(),
        readme: incoming.readme.clone(),
        metadata: incoming.metadata.clone(),
        created_at,
        updated_at: now,
    }
}

/// Why `later` cannot be merged into the group headed by `first`, if at all.
fn conflict_reason(first: &NormalizedPackage, later: &NormalizedPackage) -> Option<String> {
    if first.registry != later.registry {
        return Some(format!("registry {} vs {}", first.registry, later.registry));
    }
    if first.name != later.name {
        return Some(format!("name {:?} vs {:?}", first.name, later.name));
    }
    if first.readme != later.readme {
        return Some("readme differs".to_string());
    }
    if first.metadata != later.metadata {
        return Some("metadata differs".to_string());
    }
    None
}

fn reject(record: &NormalizedPackage, reason: String, errors: &mut Vec<(String, ChaiError)>) {
    warn!(import_id = %record.import_id, %reason, "Identity conflict, record rejected");
    errors.push((
        record.import_id.clone(),
        DiffError::IdentityConflict {
            import_id: record.import_id.clone(),
            reason,
        }
        .into(),
    ));
}

#[cfg(test)]
mod tests {
    use chai_registries::Registry;
    use proptest::prelude::*;

    use super::*;
    use crate::store::{CatalogStore, MemoryStore};
    use crate::types::{CatalogSnapshot, DependencyType, UrlType};

    fn brew(name: &str) -> NormalizedPackage {
        NormalizedPackage::new(Registry::Homebrew, name, name)
    }

    fn run(cache: &Cache, batch: &[NormalizedPackage]) -> DiffResult {
        diff(cache, batch, DiffOptions::default()).unwrap()
    }

    fn full(cache: &Cache, batch: &[NormalizedPackage]) -> DiffResult {
        let options = DiffOptions {
            full_reconciliation: true,
            ..DiffOptions::default()
        };
        diff(cache, batch, options).unwrap()
    }

    async fn applied(store: &MemoryStore, result: &DiffResult) -> Cache {
        store.apply_diff(result).await.unwrap();
        Cache::build(store.load_snapshot(Registry::Homebrew).await.unwrap())
    }

    fn sample_batch() -> Vec<NormalizedPackage> {
        let mut wget = brew("wget");
        wget.readme = Some("Internet file retriever".into());
        wget.push_url(Some("https://www.gnu.org/software/wget/"), UrlType::Homepage);
        wget.push_url(Some("https://ftp.gnu.org/gnu/wget/wget-1.24.5.tar.gz"), UrlType::Source);
        wget.push_dependencies(["openssl@3", "libidn2"], DependencyType::Runtime);
        wget.push_dependencies(["pkgconf"], DependencyType::Build);

        let mut openssl = brew("openssl@3");
        openssl.push_url(Some("https://openssl.org"), UrlType::Homepage);
        openssl.push_dependencies(["ca-certificates"], DependencyType::Runtime);

        vec![wget, openssl, brew("ca-certificates"), brew("pkgconf")]
    }

    #[test]
    fn empty_batch_is_fatal() {
        let err = diff(&Cache::default(), &[], DiffOptions::default()).unwrap_err();
        assert!(matches!(err, ChaiError::Diff(DiffError::EmptyBatch)));
    }

    #[test]
    fn first_ingest_inserts_everything() {
        let result = run(&Cache::default(), &sample_batch());

        assert_eq!(result.packages.insert.len(), 4);
        assert!(result.packages.update.is_empty());
        assert_eq!(result.urls.insert.len(), 3);
        assert_eq!(result.package_urls.insert.len(), 3);
        // wget→openssl@3, wget→pkgconf, openssl@3→ca-certificates.
        assert_eq!(result.dependencies.insert.len(), 3);
        // libidn2 is in neither the cache nor the batch.
        assert_eq!(result.unresolved_dependencies, 1);
        assert!(result.errors.is_empty());

        let wget = &result.packages.insert["wget"];
        assert_eq!(wget.derived_id, "homebrew/wget");
        let pkgconf = result.packages.insert["pkgconf"].id;
        let edge = &result.dependencies.insert[&EdgeKey {
            package_id: wget.id,
            dependency_id: pkgconf,
        }];
        assert_eq!(edge.dependency_type, DependencyType::Build);
    }

    #[tokio::test]
    async fn rediff_after_apply_is_empty() {
        let store = MemoryStore::new();
        let batch = sample_batch();
        let first = run(&Cache::default(), &batch);
        let cache = applied(&store, &first).await;

        let second = run(&cache, &batch);
        assert!(second.is_empty(), "{:?}", second.summary());
    }

    #[tokio::test]
    async fn changed_readme_updates_in_place() {
        let store = MemoryStore::new();
        let mut batch = sample_batch();
        let cache = applied(&store, &run(&Cache::default(), &batch)).await;
        let original = cache.lookup_package("wget").unwrap().clone();

        batch[0].readme = Some("GNU Wget".into());
        let result = run(&cache, &batch);

        assert_eq!(result.packages.update.len(), 1);
        let updated = &result.packages.update["wget"];
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.readme.as_deref(), Some("GNU Wget"));
        assert!(result.packages.insert.is_empty());
    }

    #[tokio::test]
    async fn lower_priority_claim_replaces_cached_type() {
        let store = MemoryStore::new();
        let mut p1 = brew("p1");
        p1.push_dependencies(["p2"], DependencyType::Build);
        let batch = vec![p1, brew("p2")];
        let cache = applied(&store, &run(&Cache::default(), &batch)).await;
        let p1_id = cache.lookup_package("p1").unwrap().id;
        let p2_id = cache.lookup_package("p2").unwrap().id;
        let cached_edge = cache.dependencies_of(p1_id).unwrap()[&p2_id].clone();

        let mut p1 = brew("p1");
        p1.push_dependencies(["p2"], DependencyType::Test);
        let result = run(&cache, &[p1, brew("p2")]);

        let key = EdgeKey {
            package_id: p1_id,
            dependency_id: p2_id,
        };
        let updated = &result.dependencies.update[&key];
        assert_eq!(updated.dependency_type, DependencyType::Test);
        assert_eq!(updated.id, cached_edge.id);
        assert!(result.dependencies.insert.is_empty());
        assert!(result.dependencies.delete.is_empty());
    }

    #[tokio::test]
    async fn dropped_claim_deletes_edge() {
        let store = MemoryStore::new();
        let batch = sample_batch();
        let cache = applied(&store, &run(&Cache::default(), &batch)).await;

        let mut wget = batch[0].clone();
        wget.dependencies.retain(|d| d.name != "pkgconf");
        let result = run(&cache, &[wget]);

        assert_eq!(result.dependencies.delete.len(), 1);
        let deleted = result.dependencies.delete.values().next().unwrap();
        assert_eq!(deleted.dependency_id, cache.lookup_package("pkgconf").unwrap().id);
    }

    #[test]
    fn duplicate_records_merge_claims() {
        let mut first = brew("curl");
        first.push_dependencies(["zlib"], DependencyType::Optional);
        let mut second = brew("curl");
        second.push_dependencies(["zlib"], DependencyType::Build);
        second.push_url(Some("https://curl.se"), UrlType::Homepage);

        let result = run(&Cache::default(), &[first, second, brew("zlib")]);

        assert_eq!(result.packages.insert.len(), 2);
        assert_eq!(result.package_urls.insert.len(), 1);
        let edge = result.dependencies.insert.values().next().unwrap();
        assert_eq!(edge.dependency_type, DependencyType::Build);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn conflicting_record_is_rejected() {
        let mut first = brew("curl");
        first.readme = Some("transfer data with URLs".into());
        let mut second = brew("curl");
        second.readme = Some("something else".into());

        let result = run(&Cache::default(), &[first, second, brew("zlib")]);

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].0, "curl");
        assert!(matches!(
            result.errors[0].1,
            ChaiError::Diff(DiffError::IdentityConflict { .. })
        ));
        // The first record survives and the rest of the batch proceeds.
        let curl = &result.packages.insert["curl"];
        assert_eq!(curl.readme.as_deref(), Some("transfer data with URLs"));
        assert!(result.packages.insert.contains_key("zlib"));
    }

    #[tokio::test]
    async fn registry_mismatch_with_cache_is_rejected() {
        let store = MemoryStore::new();
        let cache = applied(&store, &run(&Cache::default(), &[brew("jq")])).await;

        let impostor = NormalizedPackage::new(Registry::Npm, "jq", "jq");
        let result = run(&cache, &[impostor, brew("yq")]);

        assert_eq!(result.errors.len(), 1);
        assert!(result.packages.update.is_empty());
        assert!(result.packages.insert.contains_key("yq"));
    }

    #[test]
    fn shared_url_inserted_once() {
        let mut a = brew("a");
        a.push_url(Some("https://example.org"), UrlType::Homepage);
        let mut b = brew("b");
        b.push_url(Some("https://example.org"), UrlType::Homepage);
        b.push_url(Some("https://example.org"), UrlType::Repository);

        let result = run(&Cache::default(), &[a, b]);

        // Same string under two roles is two URLs.
        assert_eq!(result.urls.insert.len(), 2);
        assert_eq!(result.package_urls.insert.len(), 3);
        let homepage = result.urls.insert[&UrlKey::new("https://example.org", UrlType::Homepage)].id;
        let linked_to_homepage = result
            .package_urls
            .insert
            .keys()
            .filter(|(_, url)| *url == homepage)
            .count();
        assert_eq!(linked_to_homepage, 2);
    }

    #[tokio::test]
    async fn partial_batch_leaves_absent_packages_alone() {
        let store = MemoryStore::new();
        let cache = applied(&store, &run(&Cache::default(), &sample_batch())).await;

        let result = run(&cache, &[brew("pkgconf")]);
        assert!(result.packages.delete.is_empty());
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn full_reconciliation_cascades() {
        let store = MemoryStore::new();
        let batch = sample_batch();
        let cache = applied(&store, &run(&Cache::default(), &batch)).await;
        let openssl = cache.lookup_package("openssl@3").unwrap().id;

        // openssl@3 disappears upstream; wget stops referencing it.
        let mut wget = batch[0].clone();
        wget.dependencies.retain(|d| d.name != "openssl@3");
        let survivors = vec![wget, batch[2].clone(), batch[3].clone()];
        let result = full(&cache, &survivors);

        assert_eq!(result.packages.delete.len(), 1);
        assert!(result.packages.delete.contains_key("openssl@3"));
        assert!(result.package_urls.delete.keys().all(|(p, _)| *p == openssl));
        assert_eq!(result.package_urls.delete.len(), 1);
        // openssl@3→ca-certificates (outgoing) and wget→openssl@3 (incoming).
        assert_eq!(result.dependencies.delete.len(), 2);
        assert!(
            result
                .dependencies
                .delete
                .keys()
                .all(|k| k.package_id == openssl || k.dependency_id == openssl)
        );

        // The store accepts the cascade in reverse order.
        let cache = applied(&store, &result).await;
        assert!(cache.lookup_package("openssl@3").is_none());
    }

    #[tokio::test]
    async fn full_reconciliation_spares_protected_packages() {
        let store = MemoryStore::new();
        let batch = sample_batch();
        let cache = applied(&store, &run(&Cache::default(), &batch)).await;

        // openssl@3's record failed upstream of the engine this run.
        let survivors = vec![batch[0].clone(), batch[2].clone(), batch[3].clone()];
        let options = DiffOptions {
            full_reconciliation: true,
            protected: HashSet::from(["openssl@3".to_string()]),
            ..DiffOptions::default()
        };
        let result = diff(&cache, &survivors, options).unwrap();

        assert!(result.packages.delete.is_empty());
        assert!(result.package_urls.delete.is_empty());
        assert!(result.dependencies.delete.is_empty());
    }

    #[tokio::test]
    async fn full_reconciliation_spares_rejected_records() {
        let store = MemoryStore::new();
        let batch = sample_batch();
        let cache = applied(&store, &run(&Cache::default(), &batch)).await;

        // pkgconf shows up only under the wrong registry.
        let mut survivors: Vec<_> = batch[..3].to_vec();
        survivors.push(NormalizedPackage::new(Registry::Npm, "pkgconf", "pkgconf"));
        let result = full(&cache, &survivors);

        assert_eq!(result.errors.len(), 1);
        assert!(result.packages.delete.is_empty());
    }

    #[tokio::test]
    async fn full_reconciliation_rejects_edges_to_retired_packages() {
        let store = MemoryStore::new();
        let batch = sample_batch();
        let cache = applied(&store, &run(&Cache::default(), &batch)).await;

        // wget still claims openssl@3, but openssl@3 itself is gone.
        let survivors = vec![batch[0].clone(), batch[2].clone(), batch[3].clone()];
        let result = full(&cache, &survivors);

        let openssl = cache.lookup_package("openssl@3").unwrap().id;
        assert!(
            result
                .dependencies
                .delete
                .keys()
                .any(|k| k.dependency_id == openssl)
        );
        assert!(
            result
                .dependencies
                .insert
                .keys()
                .all(|k| k.dependency_id != openssl)
        );
        store.apply_diff(&result).await.unwrap();
    }

    fn snapshot_with_links(urls: &[String]) -> (Cache, HashMap<UrlId, String>) {
        let now = Utc::now();
        let mut snapshot = CatalogSnapshot::default();
        let pkg = to_package(&brew("pkg"), PackageId::new_v4(), now, now);
        let id = pkg.id;
        snapshot.packages.push(pkg);
        let mut by_id = HashMap::new();
        for u in urls {
            let url = Url {
                id: UrlId::new_v4(),
                url: u.clone(),
                url_type: UrlType::Homepage,
                created_at: now,
            };
            snapshot.package_urls.push(PackageUrl {
                id: PackageUrlId::new_v4(),
                package_id: id,
                url_id: url.id,
                created_at: now,
            });
            by_id.insert(url.id, url.url.clone());
            snapshot.urls.push(url);
        }
        (Cache::build(snapshot), by_id)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn link_sets_follow_set_difference(
            cached in prop::collection::btree_set("[a-e]", 0..5),
            incoming in prop::collection::btree_set("[a-e]", 0..5),
        ) {
            let to_url = |s: &String| format!("https://{s}.example");
            let cached_urls: Vec<String> = cached.iter().map(to_url).collect();
            let (cache, mut by_id) = snapshot_with_links(&cached_urls);

            let mut pkg = brew("pkg");
            for s in &incoming {
                pkg.push_url(Some(to_url(s).as_str()), UrlType::Homepage);
            }
            let result = run(&cache, &[pkg]);

            by_id.extend(result.urls.insert.values().map(|u| (u.id, u.url.clone())));
            let url_of = |url_id: &UrlId| by_id[url_id].clone();
            let inserted: BTreeSet<String> =
                result.package_urls.insert.keys().map(|(_, u)| url_of(u)).collect();
            let deleted: BTreeSet<String> =
                result.package_urls.delete.keys().map(|(_, u)| url_of(u)).collect();

            let incoming_urls: BTreeSet<String> = incoming.iter().map(to_url).collect();
            let cached_urls: BTreeSet<String> = cached_urls.into_iter().collect();
            let expected_inserted: BTreeSet<String> =
                incoming_urls.difference(&cached_urls).cloned().collect();
            let expected_deleted: BTreeSet<String> =
                cached_urls.difference(&incoming_urls).cloned().collect();
            prop_assert_eq!(&inserted, &expected_inserted);
            prop_assert_eq!(&deleted, &expected_deleted);
            prop_assert!(inserted.is_disjoint(&deleted));
            prop_assert!(result.package_urls.is_disjoint());
        }
    }
}
