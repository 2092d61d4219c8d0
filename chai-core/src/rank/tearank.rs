// TeaRank power iteration.
//
// Each iteration reads the previous score vector and writes a fresh one:
//
//     new[v] = (1-d)/N + d * dangling/N + d * Σ prev[u] * w(u,v) / out(u)
//
// where `dangling` is the total score held by packages with no outgoing
// edges. The previous vector is immutable for the whole iteration, so nodes
// can be updated in parallel and the vectors swap at the barrier.
#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::RankConfig;
use crate::error::{RankError, Result};
use crate::types::{LegacyDependency, PackageId};

use super::graph::RankGraph;
use super::{RankDiagnostics, RankResult};

#[derive(Debug, Clone, Default)]
pub struct TeaRank {
    config: RankConfig,
    cancel: Arc<AtomicBool>,
}

impl TeaRank {
    pub fn new(config: RankConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancel flag with the caller. Setting it stops the run before
    /// the next iteration starts.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &RankConfig {
        &self.config
    }

    /// Rank every package in `package_ids` over `edges`.
    pub fn rank(&self, package_ids: &[PackageId], edges: &[LegacyDependency]) -> Result<RankResult> {
        let graph = RankGraph::build(package_ids, edges, &self.config.weights);
        self.rank_graph(&graph)
    }

    pub fn rank_graph(&self, graph: &RankGraph) -> Result<RankResult> {
        let start = Instant::now();
        let n = graph.node_count();
        if n == 0 {
            info!("Empty dependency graph, nothing to rank");
            return Ok(RankResult {
                converged: true,
                ..RankResult::default()
            });
        }

        let d = self.config.damping;
        let n_f = n as f64;
        let incoming = graph.incoming_shares();
        let dangling: Vec<usize> = graph
            .out_weights()
            .iter()
            .enumerate()
            .filter(|(_, w)| **w <= 0.0)
            .map(|(i, _)| i)
            .collect();
        let diagnostics = RankDiagnostics {
            cycles: graph.cycles(),
            self_loops_dropped: graph.self_loops_dropped,
            dangling: dangling.len(),
        };

        info!(
            nodes = n,
            edges = graph.edge_count(),
            dangling = dangling.len(),
            damping = d,
            parallel = self.config.parallel,
            "Running TeaRank"
        );

        let mut prev = vec![1.0 / n_f; n];
        let mut next = vec![0.0; n];
        let mut iterations = 0;
        let mut delta = f64::INFINITY;
        let mut converged = false;
        let mut cancelled = false;

        while iterations < self.config.max_iterations {
            if self.cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }

            let dangling_mass: f64 = dangling.iter().map(|&i| prev[i]).sum();
            let base = (1.0 - d) / n_f + d * dangling_mass / n_f;
            let update = |(v, slot): (usize, &mut f64)| {
                let inflow: f64 = incoming[v].iter().map(|&(u, share)| prev[u] * share).sum();
                *slot = base + d * inflow;
            };
            if self.config.parallel {
                next.par_iter_mut().enumerate().for_each(update);
            } else {
                next.iter_mut().enumerate().for_each(update);
            }

            iterations += 1;
            delta = prev.iter().zip(&next).map(|(p, q)| (p - q).abs()).sum();
            if !delta.is_finite() {
                return Err(RankError::NonFinite {
                    iteration: iterations,
                }
                .into());
            }
            std::mem::swap(&mut prev, &mut next);
            debug!(iteration = iterations, delta, "TeaRank iteration");

            if delta < self.config.tolerance {
                converged = true;
                break;
            }
        }

        if cancelled {
            warn!(iterations, "TeaRank cancelled, returning last complete vector");
        } else if !converged {
            warn!(
                iterations,
                delta,
                tolerance = self.config.tolerance,
                "TeaRank did not converge"
            );
        }

        let scores: BTreeMap<PackageId, f64> = graph
            .index_to_node
            .iter()
            .copied()
            .zip(prev)
            .collect();

        info!(
            iterations,
            converged,
            delta,
            duration_ms = start.elapsed().as_millis(),
            "TeaRank complete"
        );

        Ok(RankResult {
            scores,
            iterations,
            converged,
            cancelled,
            delta,
            diagnostics,
        })
    }
}
