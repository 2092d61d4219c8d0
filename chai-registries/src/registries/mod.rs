pub mod crates;
pub mod debian;
mod helpers;
pub mod homebrew;
pub mod npm;
pub mod pkgx;

use std::collections::HashMap;
use std::sync::Arc;

use crate::{NormalizeError, NormalizedPackage, Registry, Result};

/// Trait implemented by each registry's normalization support.
///
/// Implementations are pure: no I/O, no knowledge of the persisted catalog.
pub trait Normalizer: Send + Sync + std::fmt::Debug {
    /// Registry this normalizer understands.
    fn registry(&self) -> Registry;

    /// Convert one decoded upstream record into canonical form.
    ///
    /// Fails with [`NormalizeError::MalformedRecord`] when identity fields are
    /// absent; never silently drops the record.
    fn normalize(&self, record: &serde_json::Value) -> Result<NormalizedPackage>;

    /// Import id a raw record claims, read without validating anything else.
    ///
    /// Lets the pipeline keep the catalog entry behind a record that failed
    /// to normalize.
    fn import_id_hint(&self, record: &serde_json::Value) -> Option<String>;
}

/// Registry of all supported normalizers, keyed by registry.
#[derive(Debug)]
pub struct NormalizerRegistry {
    normalizers: HashMap<Registry, Arc<dyn Normalizer>>,
}

impl NormalizerRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            normalizers: HashMap::new(),
        };
        reg.register(Arc::new(crates::CratesNormalizer));
        reg.register(Arc::new(homebrew::HomebrewNormalizer));
        reg.register(Arc::new(debian::DebianNormalizer));
        reg.register(Arc::new(pkgx::PkgxNormalizer));
        reg.register(Arc::new(npm::NpmNormalizer));
        reg
    }

    fn register(&mut self, normalizer: Arc<dyn Normalizer>) {
        self.normalizers.insert(normalizer.registry(), normalizer);
    }

    pub fn get(&self, registry: Registry) -> Option<Arc<dyn Normalizer>> {
        self.normalizers.get(&registry).cloned()
    }

    /// Look up a normalizer by its registry name (e.g. `"homebrew"`).
    pub fn by_name(&self, name: &str) -> Result<Arc<dyn Normalizer>> {
        let registry: Registry = name.parse()?;
        self.get(registry)
            .ok_or_else(|| NormalizeError::UnknownRegistry(name.to_string()))
    }

    pub fn registries(&self) -> Vec<Registry> {
        let mut ids: Vec<Registry> = self.normalizers.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
