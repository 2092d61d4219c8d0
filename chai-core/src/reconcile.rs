// Dependency reconciliation: collapse competing claims about one edge into a
// single canonical type.
//
// The canonical type is the highest-priority claim. Because the result is a
// maximum, it does not depend on the order claims arrive in.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use chai_registries::NormalizedPackage;

use crate::types::DependencyType;

/// Fold `(edge, type)` claims into one canonical type per edge.
pub fn reconcile<K, I>(claims: I) -> HashMap<K, DependencyType>
where
    K: Eq + Hash,
    I: IntoIterator<Item = (K, DependencyType)>,
{
    let mut canonical: HashMap<K, DependencyType> = HashMap::new();
    for (edge, dep_type) in claims {
        match canonical.entry(edge) {
            Entry::Occupied(mut e) => {
                if dep_type > *e.get() {
                    e.insert(dep_type);
                }
            }
            Entry::Vacant(e) => {
                e.insert(dep_type);
            }
        }
    }
    canonical
}

/// Batch-wide reconciler keyed by `import_id`s.
///
/// Claims from every record of the batch accumulate, so a package that shows
/// up in two records contributes the union of both claim sets.
#[derive(Debug, Default)]
pub struct DependencyReconciler {
    edges: HashMap<String, BTreeMap<String, DependencyType>>,
}

impl DependencyReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_claim(&mut self, dependent: &str, dependency: &str, dep_type: DependencyType) {
        let slot = self
            .edges
            .entry(dependent.to_string())
            .or_default()
            .entry(dependency.to_string())
            .or_insert(dep_type);
        if dep_type > *slot {
            *slot = dep_type;
        }
    }

    pub fn add_package(&mut self, pkg: &NormalizedPackage) {
        // A package with no claims still has an (empty) canonical edge set.
        self.edges.entry(pkg.import_id.clone()).or_default();
        for claim in &pkg.dependencies {
            self.add_claim(&pkg.import_id, &claim.name, claim.dependency_type);
        }
    }

    /// Canonical outgoing edges for `dependent`, sorted by dependency name.
    pub fn canonical(&self, dependent: &str) -> Option<&BTreeMap<String, DependencyType>> {
        self.edges.get(dependent)
    }

    /// Total number of canonical edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeMap::len).sum()
    }
}
