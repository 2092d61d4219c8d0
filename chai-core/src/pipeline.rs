// Ingestion orchestrator: normalize → diff → apply → rank, with per-record
// error collection.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use chai_registries::{NormalizeError, NormalizedPackage, Normalizer};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::cache::Cache;
use crate::config::ChaiConfig;
use crate::diff::{DiffEngine, DiffOptions, DiffSummary};
use crate::error::{ChaiError, DiffError, RankError, Result};
use crate::rank::{RankResult, TeaRank};
use crate::store::{ApplyStats, CatalogStore};
use crate::types::Registry;

/// Statistics returned by one ingestion run.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub registry: Option<Registry>,
    pub records: usize,
    pub normalized: usize,
    pub diff: DiffSummary,
    pub applied: ApplyStats,
    pub rank: Option<RankSummary>,
    pub duration: Duration,
    /// Per-record failures: malformed records and identity conflicts.
    pub errors: Vec<(String, ChaiError)>,
}

impl IngestStats {
    pub fn unresolved_dependencies(&self) -> usize {
        self.diff.unresolved_dependencies
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankSummary {
    pub packages: usize,
    pub iterations: u32,
    pub converged: bool,
    pub cancelled: bool,
    pub cycles: usize,
}

impl From<&RankResult> for RankSummary {
    fn from(result: &RankResult) -> Self {
        Self {
            packages: result.scores.len(),
            iterations: result.iterations,
            converged: result.converged,
            cancelled: result.cancelled,
            cycles: result.diagnostics.cycles.len(),
        }
    }
}

/// Output of [`IngestPipeline::normalize_batch`].
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub packages: Vec<NormalizedPackage>,
    pub errors: Vec<(String, ChaiError)>,
    /// Import ids claimed by records that failed to normalize.
    pub failed_ids: HashSet<String>,
    /// Failed records whose import id could not be read at all.
    pub unidentified: usize,
}

/// Runs one registry's batch through the full pipeline against a
/// [`CatalogStore`].
#[derive(Debug)]
pub struct IngestPipeline {
    normalizer: Arc<dyn Normalizer>,
    config: ChaiConfig,
    cancel: Arc<AtomicBool>,
}

impl IngestPipeline {
    pub fn new(normalizer: Arc<dyn Normalizer>, config: ChaiConfig) -> Self {
        Self {
            normalizer,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn registry(&self) -> Registry {
        self.normalizer.registry()
    }

    /// Flag that stops a running TeaRank pass between iterations.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Normalize every record, keeping the good ones and labelling failures.
    pub fn normalize_batch(&self, records: &[serde_json::Value]) -> NormalizedBatch {
        let mut batch = NormalizedBatch {
            packages: Vec::with_capacity(records.len()),
            ..NormalizedBatch::default()
        };
        for (i, record) in records.iter().enumerate() {
            match self.normalizer.normalize(record) {
                Ok(package) => batch.packages.push(package),
                Err(e) => {
                    let label = match &e {
                        NormalizeError::MalformedRecord { record, .. } => record.clone(),
                        NormalizeError::UnknownRegistry(_) => format!("#{i}"),
                    };
                    warn!(record = %label, error = %e, "Skipping malformed record");
                    match self.normalizer.import_id_hint(record) {
                        Some(import_id) => {
                            batch.failed_ids.insert(import_id);
                        }
                        None => batch.unidentified += 1,
                    }
                    batch.errors.push((label, e.into()));
                }
            }
        }
        batch
    }

    #[instrument(skip_all, fields(registry = %self.registry()))]
    pub async fn run(
        &self,
        store: &dyn CatalogStore,
        records: &[serde_json::Value],
    ) -> Result<IngestStats> {
        let start = Instant::now();
        let registry = self.registry();
        if records.is_empty() {
            return Err(DiffError::EmptyBatch.into());
        }

        let mut stats = IngestStats {
            registry: Some(registry),
            records: records.len(),
            ..IngestStats::default()
        };

        let NormalizedBatch {
            packages: batch,
            errors,
            failed_ids,
            unidentified,
        } = self.normalize_batch(records);
        stats.normalized = batch.len();
        stats.errors = errors;
        if batch.is_empty() {
            warn!(records = records.len(), "Every record was malformed, nothing to ingest");
            stats.diff.errors = stats.errors.len();
            stats.duration = start.elapsed();
            return Ok(stats);
        }

        let cache = Cache::build(store.load_snapshot(registry).await?);
        let mut full_reconciliation = self.config.ingest.full_reconciliation;
        if full_reconciliation && unidentified > 0 {
            // Any cached package could be the one behind the unreadable record.
            warn!(unidentified, "Unidentified malformed records, skipping package retirement");
            full_reconciliation = false;
        }
        let options = DiffOptions {
            full_reconciliation,
            protected: failed_ids,
            now: Utc::now(),
        };
        let mut diff = DiffEngine::new(&cache, options).diff(&batch)?;
        stats.errors.append(&mut diff.errors);
        stats.diff = diff.summary();
        stats.diff.errors = stats.errors.len();

        store.begin_transaction().await?;
        match store.apply_diff(&diff).await {
            Ok(applied) => {
                store.commit_transaction().await?;
                stats.applied = applied;
            }
            Err(e) => {
                warn!(error = %e, "Apply failed, rolling back");
                store.rollback_transaction().await?;
                return Err(e);
            }
        }

        let ranks = self.rank(store).await?;
        store.store_ranks(&ranks).await?;
        stats.rank = Some(RankSummary::from(&ranks));

        stats.duration = start.elapsed();
        info!(
            records = stats.records,
            normalized = stats.normalized,
            rows = stats.applied.total(),
            unresolved = stats.unresolved_dependencies(),
            errors = stats.errors.len(),
            duration_ms = stats.duration.as_millis(),
            "Ingestion complete"
        );
        Ok(stats)
    }

    /// Recompute TeaRank over the whole catalog.
    ///
    /// The iteration is CPU-bound, so it runs on the blocking pool.
    pub async fn rank(&self, store: &dyn CatalogStore) -> Result<RankResult> {
        let package_ids = store.load_package_ids().await?;
        let edges = store.load_dependency_edges().await?;
        let engine = TeaRank::new(self.config.rank.clone()).with_cancel_flag(self.cancel_flag());

        tokio::task::spawn_blocking(move || engine.rank(&package_ids, &edges))
            .await
            .map_err(|e| ChaiError::from(RankError::Aborted(e.to_string())))?
    }
}

#[cfg(test)]
mod tests {
    use chai_registries::registries::homebrew::HomebrewNormalizer;
    use serde_json::json;

    use super::*;
    use crate::config::IngestSection;
    use crate::store::MemoryStore;

    fn pipeline() -> IngestPipeline {
        IngestPipeline::new(Arc::new(HomebrewNormalizer), ChaiConfig::default())
    }

    fn formula(name: &str, deps: &[&str]) -> serde_json::Value {
        json!({
            "formula": name,
            "description": format!("{name} formula"),
            "homepage": format!("https://{name}.example.org"),
            "dependencies": deps,
        })
    }

    #[tokio::test]
    async fn empty_input_is_fatal() {
        let store = MemoryStore::new();
        let err = pipeline().run(&store, &[]).await.unwrap_err();
        assert!(matches!(err, ChaiError::Diff(DiffError::EmptyBatch)));
    }

    #[tokio::test]
    async fn ingest_then_rank() {
        let store = MemoryStore::new();
        let records = [
            formula("wget", &["openssl@3"]),
            formula("curl", &["openssl@3"]),
            formula("openssl@3", &[]),
        ];
        let stats = pipeline().run(&store, &records).await.unwrap();

        assert_eq!(stats.normalized, 3);
        assert_eq!(stats.applied.packages.insert, 3);
        assert_eq!(stats.applied.dependencies.insert, 2);
        assert!(stats.errors.is_empty());
        let rank = stats.rank.unwrap();
        assert_eq!(rank.packages, 3);
        assert!(rank.converged);

        let ranks = store.load_ranks().await.unwrap();
        let total: f64 = ranks.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn failed_records_report_their_import_id() {
        let batch = pipeline().normalize_batch(&[
            formula("wget", &[]),
            json!({"formula": "curl", "dependencies": "openssl@3"}),
            json!({"description": "no formula name"}),
        ]);
        assert_eq!(batch.packages.len(), 1);
        assert_eq!(batch.errors.len(), 2);
        assert_eq!(batch.failed_ids, HashSet::from(["curl".to_string()]));
        assert_eq!(batch.unidentified, 1);
    }

    #[tokio::test]
    async fn unidentified_failure_suspends_retirement() {
        let store = MemoryStore::new();
        pipeline()
            .run(&store, &[formula("wget", &[]), formula("curl", &[])])
            .await
            .unwrap();

        let config = ChaiConfig {
            ingest: IngestSection {
                full_reconciliation: true,
            },
            ..ChaiConfig::default()
        };
        let stats = IngestPipeline::new(Arc::new(HomebrewNormalizer), config)
            .run(&store, &[formula("wget", &[]), json!({"description": "nameless"})])
            .await
            .unwrap();

        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.applied.packages.delete, 0);
        assert_eq!(store.stats().await.unwrap().packages, 2);
    }

    #[tokio::test]
    async fn all_malformed_changes_nothing() {
        let store = MemoryStore::new();
        let stats = pipeline()
            .run(&store, &[json!({"description": "no formula name"}), json!(42)])
            .await
            .unwrap();
        assert_eq!(stats.errors.len(), 2);
        assert!(stats.rank.is_none());
        assert_eq!(store.stats().await.unwrap().packages, 0);
    }
}
