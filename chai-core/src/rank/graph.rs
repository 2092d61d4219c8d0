// Weighted dependency graph for TeaRank.
#![allow(clippy::cast_precision_loss)]

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EdgeWeights;
use crate::types::{LegacyDependency, PackageId};

/// Members of one strongly connected component with more than one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCycleWarning {
    /// Sorted by id.
    pub members: Vec<PackageId>,
}

/// A petgraph `DiGraph` over packages, with `PackageId` ↔ `NodeIndex` mapping.
///
/// Nodes are added in `PackageId` order and edges in `(source, target)` order,
/// so the same input always yields the same node indices whatever order it
/// arrived in. Self-edges are dropped and counted.
#[derive(Debug, Default)]
pub struct RankGraph {
    pub graph: DiGraph<PackageId, f64>,
    pub node_to_index: HashMap<PackageId, NodeIndex>,
    pub index_to_node: Vec<PackageId>,
    pub self_loops_dropped: usize,
}

impl RankGraph {
    /// Build the graph from every catalog package plus the reconciled edges.
    ///
    /// Edge endpoints missing from `package_ids` still become nodes.
    pub fn build(
        package_ids: &[PackageId],
        edges: &[LegacyDependency],
        weights: &EdgeWeights,
    ) -> Self {
        let mut ids: BTreeSet<PackageId> = package_ids.iter().copied().collect();
        let mut weighted: BTreeMap<(PackageId, PackageId), f64> = BTreeMap::new();
        let mut self_loops_dropped = 0;

        for edge in edges {
            ids.insert(edge.package_id);
            ids.insert(edge.dependency_id);
            if edge.is_self_edge() {
                self_loops_dropped += 1;
                continue;
            }
            let w = weights.weight(edge.dependency_type);
            weighted
                .entry((edge.package_id, edge.dependency_id))
                .and_modify(|existing| *existing = existing.max(w))
                .or_insert(w);
        }

        let mut graph = DiGraph::with_capacity(ids.len(), weighted.len());
        let mut node_to_index = HashMap::with_capacity(ids.len());
        let mut index_to_node = Vec::with_capacity(ids.len());
        for id in ids {
            let idx = graph.add_node(id);
            node_to_index.insert(id, idx);
            index_to_node.push(id);
        }
        for ((source, target), w) in weighted {
            graph.add_edge(node_to_index[&source], node_to_index[&target], w);
        }

        if self_loops_dropped > 0 {
            debug!(self_loops_dropped, "Dropped self-dependencies before ranking");
        }

        Self {
            graph,
            node_to_index,
            index_to_node,
            self_loops_dropped,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Sum of outgoing edge weights per node, by node index.
    pub fn out_weights(&self) -> Vec<f64> {
        self.graph
            .node_indices()
            .map(|n| self.graph.edges(n).map(|e| *e.weight()).sum())
            .collect()
    }

    /// For every node, `(source index, share)` of each incoming edge, where
    /// share is the edge weight over the source's total outgoing weight.
    /// Sources are sorted, which fixes the summation order.
    pub fn incoming_shares(&self) -> Vec<Vec<(usize, f64)>> {
        let out = self.out_weights();
        let mut incoming: Vec<Vec<(usize, f64)>> = vec![Vec::new(); self.node_count()];
        for edge in self.graph.edge_references() {
            let src = edge.source().index();
            incoming[edge.target().index()].push((src, *edge.weight() / out[src]));
        }
        for list in &mut incoming {
            list.sort_by_key(|(src, _)| *src);
        }
        incoming
    }

    /// Strongly connected components with more than one member.
    pub fn cycles(&self) -> Vec<GraphCycleWarning> {
        let mut cycles: Vec<GraphCycleWarning> = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut members: Vec<PackageId> =
                    component.iter().map(|idx| self.index_to_node[idx.index()]).collect();
                members.sort();
                GraphCycleWarning { members }
            })
            .collect();
        cycles.sort_by(|a, b| a.members.cmp(&b.members));
        if !cycles.is_empty() {
            let largest = cycles.iter().map(|c| c.members.len()).max().unwrap_or(0);
            warn!(cycles = cycles.len(), largest, "Dependency graph contains cycles");
        }
        cycles
    }
}
