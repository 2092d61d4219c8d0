//! TeaRank: a PageRank variant over the weighted dependency graph.
//!
//! Scores flow from a package to the packages it depends on, in proportion
//! to the edge weight of each dependency type. Every ranking run is a full
//! recomputation over the catalog's current edge set.

pub mod graph;
pub mod tearank;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::PackageId;

pub use graph::{GraphCycleWarning, RankGraph};
pub use tearank::TeaRank;

/// Non-fatal findings from a ranking run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankDiagnostics {
    pub cycles: Vec<GraphCycleWarning>,
    pub self_loops_dropped: usize,
    /// Packages without outgoing edges.
    pub dangling: usize,
}

/// Output of one TeaRank run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankResult {
    /// Sums to 1 over all packages (empty for an empty catalog).
    pub scores: BTreeMap<PackageId, f64>,
    pub iterations: u32,
    pub converged: bool,
    /// Stopped early through the cancel flag.
    pub cancelled: bool,
    /// L1 change of the last completed iteration.
    pub delta: f64,
    pub diagnostics: RankDiagnostics,
}

impl RankResult {
    pub fn score(&self, id: PackageId) -> Option<f64> {
        self.scores.get(&id).copied()
    }

    pub fn total(&self) -> f64 {
        self.scores.values().sum()
    }

    /// Packages ordered by descending score, ties broken by id.
    pub fn ranked(&self) -> Vec<(PackageId, f64)> {
        let mut ranked: Vec<(PackageId, f64)> = self.scores.iter().map(|(k, v)| (*k, *v)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }
}
