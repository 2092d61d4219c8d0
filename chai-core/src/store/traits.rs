use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diff::{ChangeCounts, DiffResult};
use crate::rank::RankResult;
use crate::types::{CatalogSnapshot, LegacyDependency, PackageId, Registry};

/// The persistence collaborator. The pipeline reads the catalog and writes
/// change-sets and rank scores only through this trait.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    // ── Catalog reads ──────────────────────────────────────────────

    /// Packages of `registry`, with their links and outgoing edges, plus
    /// every known URL.
    async fn load_snapshot(&self, registry: Registry) -> crate::error::Result<CatalogSnapshot>;

    /// Ids of every package in the catalog, across registries.
    async fn load_package_ids(&self) -> crate::error::Result<Vec<PackageId>>;

    /// Every dependency edge in the catalog, across registries.
    async fn load_dependency_edges(&self) -> crate::error::Result<Vec<LegacyDependency>>;

    // ── Catalog writes ─────────────────────────────────────────────

    /// Apply a change-set: inserts and updates in
    /// [`EntityKind::APPLY_ORDER`](crate::types::EntityKind::APPLY_ORDER),
    /// then deletes in reverse. Either every change lands or none does.
    async fn apply_diff(&self, diff: &DiffResult) -> crate::error::Result<ApplyStats>;

    // ── Ranks ──────────────────────────────────────────────────────

    /// Replace all stored scores with `ranks`.
    async fn store_ranks(&self, ranks: &RankResult) -> crate::error::Result<()>;

    async fn load_ranks(&self) -> crate::error::Result<BTreeMap<PackageId, f64>>;

    // ── Transactions ──────────────────────────────────────────────

    /// Begin an explicit transaction. Default: no-op (each operation
    /// auto-commits).
    async fn begin_transaction(&self) -> crate::error::Result<()> {
        Ok(())
    }

    async fn commit_transaction(&self) -> crate::error::Result<()> {
        Ok(())
    }

    async fn rollback_transaction(&self) -> crate::error::Result<()> {
        Ok(())
    }

    // ── Metrics ────────────────────────────────────────────────────

    async fn stats(&self) -> crate::error::Result<StoreStats>;
}

/// Rows touched by one [`CatalogStore::apply_diff`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyStats {
    pub packages: ChangeCounts,
    pub urls: ChangeCounts,
    pub package_urls: ChangeCounts,
    pub dependencies: ChangeCounts,
}

impl ApplyStats {
    pub fn total(&self) -> usize {
        [self.packages, self.urls, self.package_urls, self.dependencies]
            .iter()
            .map(|c| c.insert + c.update + c.delete)
            .sum()
    }
}

/// Row counts of a catalog store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub packages: u64,
    /// Package count broken down by registry name.
    pub packages_by_registry: BTreeMap<String, u64>,
    pub urls: u64,
    pub package_urls: u64,
    pub dependencies: u64,
    pub ranked: u64,
}
