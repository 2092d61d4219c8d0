// In-process catalog store.
//
// Every write runs against a clone of the current state and is swapped in
// only when all of its referential checks pass, so a failed apply leaves the
// catalog untouched. `begin_transaction` checkpoints the state and
// `rollback_transaction` restores the checkpoint.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::diff::{ChangeCounts, DiffResult, EntityDiff};
use crate::error::StoreError;
use crate::rank::RankResult;
use crate::types::{
    CatalogSnapshot, EdgeKey, EntityKind, LegacyDependency, Package, PackageId, PackageUrl,
    Registry, Url, UrlId, UrlKey,
};

use super::traits::{ApplyStats, CatalogStore, StoreStats};

type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    packages: BTreeMap<PackageId, Package>,
    by_import_id: HashMap<(Registry, String), PackageId>,
    urls: BTreeMap<UrlId, Url>,
    by_url_key: HashMap<UrlKey, UrlId>,
    package_urls: BTreeMap<(PackageId, UrlId), PackageUrl>,
    dependencies: BTreeMap<EdgeKey, LegacyDependency>,
    ranks: BTreeMap<PackageId, f64>,
}

impl MemoryState {
    fn apply(&mut self, diff: &DiffResult) -> StoreResult<ApplyStats> {
        let mut stats = ApplyStats::default();

        for kind in EntityKind::APPLY_ORDER {
            match kind {
                EntityKind::Package => {
                    self.upsert_all(
                        &diff.packages,
                        &mut stats.packages,
                        Self::insert_package,
                        Self::update_package,
                    )?;
                }
                EntityKind::Url => {
                    self.upsert_all(
                        &diff.urls,
                        &mut stats.urls,
                        Self::insert_url,
                        Self::update_url,
                    )?;
                }
                EntityKind::PackageUrl => {
                    self.upsert_all(
                        &diff.package_urls,
                        &mut stats.package_urls,
                        Self::insert_package_url,
                        |_, link: &PackageUrl| {
                            Err(StoreError::DuplicateKey(format!(
                                "package_url {} is immutable",
                                link.id
                            )))
                        },
                    )?;
                }
                EntityKind::Dependency => {
                    self.upsert_all(
                        &diff.dependencies,
                        &mut stats.dependencies,
                        Self::insert_dependency,
                        Self::update_dependency,
                    )?;
                }
            }
        }

        for kind in EntityKind::APPLY_ORDER.iter().rev() {
            match kind {
                EntityKind::Dependency => {
                    for key in diff.dependencies.delete.keys() {
                        self.delete_dependency(key)?;
                    }
                    stats.dependencies.delete = diff.dependencies.delete.len();
                }
                EntityKind::PackageUrl => {
                    for key in diff.package_urls.delete.keys() {
                        self.delete_package_url(*key)?;
                    }
                    stats.package_urls.delete = diff.package_urls.delete.len();
                }
                EntityKind::Url => {
                    for url in diff.urls.delete.values() {
                        self.delete_url(url.id)?;
                    }
                    stats.urls.delete = diff.urls.delete.len();
                }
                EntityKind::Package => {
                    for package in diff.packages.delete.values() {
                        self.delete_package(package.id)?;
                    }
                    stats.packages.delete = diff.packages.delete.len();
                }
            }
        }

        Ok(stats)
    }

    fn upsert_all<K: Ord, V>(
        &mut self,
        changes: &EntityDiff<K, V>,
        counts: &mut ChangeCounts,
        insert: impl Fn(&mut Self, &V) -> StoreResult<()>,
        update: impl Fn(&mut Self, &V) -> StoreResult<()>,
    ) -> StoreResult<()> {
        for row in changes.insert.values() {
            insert(self, row)?;
        }
        for row in changes.update.values() {
            update(self, row)?;
        }
        counts.insert = changes.insert.len();
        counts.update = changes.update.len();
        Ok(())
    }

    // ── Packages ───────────────────────────────────────────────────

    fn insert_package(&mut self, package: &Package) -> StoreResult<()> {
        let identity = (package.registry, package.import_id.clone());
        if self.packages.contains_key(&package.id) || self.by_import_id.contains_key(&identity) {
            return Err(StoreError::DuplicateKey(format!(
                "package {}/{}",
                package.registry, package.import_id
            )));
        }
        self.by_import_id.insert(identity, package.id);
        self.packages.insert(package.id, package.clone());
        Ok(())
    }

    fn update_package(&mut self, package: &Package) -> StoreResult<()> {
        let existing = self
            .packages
            .get_mut(&package.id)
            .ok_or_else(|| StoreError::NotFound(format!("package {}", package.id)))?;
        if existing.registry != package.registry || existing.import_id != package.import_id {
            return Err(StoreError::DuplicateKey(format!(
                "package {} cannot change identity to {}/{}",
                package.id, package.registry, package.import_id
            )));
        }
        *existing = package.clone();
        Ok(())
    }

    fn delete_package(&mut self, id: PackageId) -> StoreResult<()> {
        if self.package_urls.keys().any(|(p, _)| *p == id) {
            return Err(StoreError::DanglingReference(format!(
                "package {id} still has URL links"
            )));
        }
        if self
            .dependencies
            .keys()
            .any(|k| k.package_id == id || k.dependency_id == id)
        {
            return Err(StoreError::DanglingReference(format!(
                "package {id} still has dependency edges"
            )));
        }
        let package = self
            .packages
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("package {id}")))?;
        self.by_import_id.remove(&(package.registry, package.import_id));
        self.ranks.remove(&id);
        Ok(())
    }

    // ── URLs ───────────────────────────────────────────────────────

    fn insert_url(&mut self, url: &Url) -> StoreResult<()> {
        let key = url.key();
        if self.urls.contains_key(&url.id) || self.by_url_key.contains_key(&key) {
            return Err(StoreError::DuplicateKey(format!(
                "url {} ({})",
                url.url, url.url_type
            )));
        }
        self.by_url_key.insert(key, url.id);
        self.urls.insert(url.id, url.clone());
        Ok(())
    }

    fn update_url(&mut self, url: &Url) -> StoreResult<()> {
        match self.urls.get(&url.id) {
            Some(existing) if existing.key() == url.key() => Ok(()),
            Some(_) => Err(StoreError::DuplicateKey(format!("url {} is immutable", url.id))),
            None => Err(StoreError::NotFound(format!("url {}", url.id))),
        }
    }

    fn delete_url(&mut self, id: UrlId) -> StoreResult<()> {
        if self.package_urls.keys().any(|(_, u)| *u == id) {
            return Err(StoreError::DanglingReference(format!(
                "url {id} is still linked"
            )));
        }
        let url = self
            .urls
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("url {id}")))?;
        self.by_url_key.remove(&url.key());
        Ok(())
    }

    // ── Links ──────────────────────────────────────────────────────

    fn insert_package_url(&mut self, link: &PackageUrl) -> StoreResult<()> {
        if !self.packages.contains_key(&link.package_id) {
            return Err(StoreError::DanglingReference(format!(
                "link {} names missing package {}",
                link.id, link.package_id
            )));
        }
        if !self.urls.contains_key(&link.url_id) {
            return Err(StoreError::DanglingReference(format!(
                "link {} names missing url {}",
                link.id, link.url_id
            )));
        }
        if self.package_urls.contains_key(&link.key()) {
            return Err(StoreError::DuplicateKey(format!(
                "link {} -> {}",
                link.package_id, link.url_id
            )));
        }
        self.package_urls.insert(link.key(), link.clone());
        Ok(())
    }

    fn delete_package_url(&mut self, key: (PackageId, UrlId)) -> StoreResult<()> {
        self.package_urls
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("link {} -> {}", key.0, key.1)))
    }

    // ── Dependencies ───────────────────────────────────────────────

    fn check_endpoints(&self, edge: &LegacyDependency) -> StoreResult<()> {
        for id in [edge.package_id, edge.dependency_id] {
            if !self.packages.contains_key(&id) {
                return Err(StoreError::DanglingReference(format!(
                    "edge {} names missing package {id}",
                    edge.id
                )));
            }
        }
        Ok(())
    }

    fn insert_dependency(&mut self, edge: &LegacyDependency) -> StoreResult<()> {
        self.check_endpoints(edge)?;
        if self.dependencies.contains_key(&edge.key()) {
            return Err(StoreError::DuplicateKey(format!(
                "edge {} -> {}",
                edge.package_id, edge.dependency_id
            )));
        }
        self.dependencies.insert(edge.key(), edge.clone());
        Ok(())
    }

    fn update_dependency(&mut self, edge: &LegacyDependency) -> StoreResult<()> {
        self.check_endpoints(edge)?;
        let existing = self.dependencies.get_mut(&edge.key()).ok_or_else(|| {
            StoreError::NotFound(format!("edge {} -> {}", edge.package_id, edge.dependency_id))
        })?;
        *existing = edge.clone();
        Ok(())
    }

    fn delete_dependency(&mut self, key: &EdgeKey) -> StoreResult<()> {
        self.dependencies
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("edge {} -> {}", key.package_id, key.dependency_id)))
    }

    // ── Reads ──────────────────────────────────────────────────────

    fn snapshot(&self, registry: Registry) -> CatalogSnapshot {
        let packages: Vec<Package> = self
            .packages
            .values()
            .filter(|p| p.registry == registry)
            .cloned()
            .collect();
        let in_registry = |id: &PackageId| {
            self.packages
                .get(id)
                .is_some_and(|p| p.registry == registry)
        };
        CatalogSnapshot {
            packages,
            urls: self.urls.values().cloned().collect(),
            package_urls: self
                .package_urls
                .values()
                .filter(|l| in_registry(&l.package_id))
                .cloned()
                .collect(),
            dependencies: self
                .dependencies
                .values()
                .filter(|e| in_registry(&e.package_id))
                .cloned()
                .collect(),
        }
    }
}

/// A [`CatalogStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    checkpoint: Mutex<Option<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from a snapshot, enforcing the same checks as
    /// [`CatalogStore::apply_diff`].
    pub fn from_snapshot(snapshot: &CatalogSnapshot) -> crate::error::Result<Self> {
        let mut state = MemoryState::default();
        for package in &snapshot.packages {
            state.insert_package(package)?;
        }
        for url in &snapshot.urls {
            state.insert_url(url)?;
        }
        for link in &snapshot.package_urls {
            state.insert_package_url(link)?;
        }
        for edge in &snapshot.dependencies {
            state.insert_dependency(edge)?;
        }
        Ok(Self {
            state: Mutex::new(state),
            checkpoint: Mutex::new(None),
        })
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panic mid-write never leaves a half-applied state behind, since
        // writes swap in a finished copy.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checkpoint(&self) -> MutexGuard<'_, Option<MemoryState>> {
        self.checkpoint.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryStore {
    async fn load_snapshot(&self, registry: Registry) -> crate::error::Result<CatalogSnapshot> {
        let snapshot = self.state().snapshot(registry);
        debug!(
            %registry,
            packages = snapshot.packages.len(),
            dependencies = snapshot.dependencies.len(),
            "Loaded catalog snapshot"
        );
        Ok(snapshot)
    }

    async fn load_package_ids(&self) -> crate::error::Result<Vec<PackageId>> {
        Ok(self.state().packages.keys().copied().collect())
    }

    async fn load_dependency_edges(&self) -> crate::error::Result<Vec<LegacyDependency>> {
        Ok(self.state().dependencies.values().cloned().collect())
    }

    async fn apply_diff(&self, diff: &DiffResult) -> crate::error::Result<ApplyStats> {
        let mut state = self.state();
        let mut staged = state.clone();
        let stats = staged.apply(diff)?;
        *state = staged;
        info!(
            rows = stats.total(),
            packages = ?stats.packages,
            dependencies = ?stats.dependencies,
            "Applied change-set"
        );
        Ok(stats)
    }

    async fn store_ranks(&self, ranks: &RankResult) -> crate::error::Result<()> {
        let mut state = self.state();
        if let Some(id) = ranks.scores.keys().find(|id| !state.packages.contains_key(*id)) {
            return Err(StoreError::DanglingReference(format!("score for missing package {id}")).into());
        }
        state.ranks.clone_from(&ranks.scores);
        Ok(())
    }

    async fn load_ranks(&self) -> crate::error::Result<BTreeMap<PackageId, f64>> {
        Ok(self.state().ranks.clone())
    }

    async fn begin_transaction(&self) -> crate::error::Result<()> {
        let snapshot = self.state().clone();
        *self.checkpoint() = Some(snapshot);
        Ok(())
    }

    async fn commit_transaction(&self) -> crate::error::Result<()> {
        *self.checkpoint() = None;
        Ok(())
    }

    async fn rollback_transaction(&self) -> crate::error::Result<()> {
        if let Some(saved) = self.checkpoint().take() {
            *self.state() = saved;
            debug!("Rolled back to transaction checkpoint");
        }
        Ok(())
    }

    async fn stats(&self) -> crate::error::Result<StoreStats> {
        let state = self.state();
        let mut packages_by_registry = BTreeMap::new();
        for package in state.packages.values() {
            *packages_by_registry
                .entry(package.registry.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(StoreStats {
            packages: state.packages.len() as u64,
            packages_by_registry,
            urls: state.urls.len() as u64,
            package_urls: state.package_urls.len() as u64,
            dependencies: state.dependencies.len() as u64,
            ranked: state.ranks.len() as u64,
        })
    }
}
