use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DependencyType, NormalizedPackage, Registry, Result, UrlType};

use super::Normalizer;
use super::helpers::{decode, missing_field, null_as_empty, require};

/// A crate as exported by the crates.io database dump.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrateRecord {
    pub id: Option<u64>,
    pub name: Option<String>,
    #[serde(default)]
    pub readme: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub latest_version: Option<CrateVersion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrateVersion {
    pub num: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dependencies: Vec<CrateDependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrateDependency {
    /// crates.io id of the crate depended upon.
    pub dependency_id: u64,
    #[serde(default)]
    pub kind: Option<CrateDependencyKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrateDependencyKind {
    Normal,
    Build,
    Dev,
    Optional,
    #[serde(other)]
    Unknown,
}

impl CrateDependencyKind {
    fn normalized(self) -> DependencyType {
        match self {
            Self::Normal | Self::Unknown => DependencyType::Runtime,
            Self::Build => DependencyType::Build,
            Self::Dev => DependencyType::Development,
            Self::Optional => DependencyType::Optional,
        }
    }
}

#[derive(Debug)]
pub struct CratesNormalizer;

impl CratesNormalizer {
    pub fn normalize_crate(
        &self,
        record: &serde_json::Value,
        krate: &CrateRecord,
    ) -> Result<NormalizedPackage> {
        let id = krate
            .id
            .ok_or_else(|| missing_field(Registry::Crates, record, "id"))?;
        let name = require(Registry::Crates, record, "name", krate.name.as_deref())?;

        let mut pkg = NormalizedPackage::new(Registry::Crates, id.to_string(), name);
        pkg.readme.clone_from(&krate.readme);

        pkg.push_url(krate.homepage.as_deref(), UrlType::Homepage);
        pkg.push_url(krate.repository.as_deref(), UrlType::Repository);
        pkg.push_url(krate.documentation.as_deref(), UrlType::Documentation);
        pkg.push_url(krate.source.as_deref(), UrlType::Source);

        if let Some(version) = &krate.latest_version {
            if let Some(num) = &version.num {
                pkg.metadata
                    .insert("version".into(), serde_json::Value::from(num.as_str()));
            }
            if let Some(license) = &version.license {
                pkg.metadata
                    .insert("license".into(), serde_json::Value::from(license.as_str()));
            }
            for dep in &version.dependencies {
                let Some(kind) = dep.kind else {
                    debug!(krate = id, dependency = dep.dependency_id, "Skipping untyped dependency");
                    continue;
                };
                let dep_name = dep.dependency_id.to_string();
                pkg.push_dependencies([dep_name.as_str()], kind.normalized());
            }
        }

        Ok(pkg)
    }
}

impl Normalizer for CratesNormalizer {
    fn registry(&self) -> Registry {
        Registry::Crates
    }

    fn normalize(&self, record: &serde_json::Value) -> Result<NormalizedPackage> {
        let krate: CrateRecord = decode(Registry::Crates, record)?;
        self.normalize_crate(record, &krate)
    }

    /// The numeric crate id, which is the import id.
    fn import_id_hint(&self, record: &serde_json::Value) -> Option<String> {
        record.get("id")?.as_u64().map(|id| id.to_string())
    }
}
